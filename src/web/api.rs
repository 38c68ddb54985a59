//! Defines the Axum API routes and handlers.

use crate::file_manager::{ScriptStore, ScriptStoreError};
use crate::joystick::{Joystick, JoystickAction};
use crate::motion::ControllerError;
use crate::notices::Notices;
use crate::web::models::{JoystickRequest, MessageResponse, ScriptListResponse, StartResponse, StatusResponse};
use crate::web::motion_channel::MotionRequest;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;

pub struct AppStateInner {
    pub motion_tx: Sender<MotionRequest>,
    pub scripts: ScriptStore,
    pub notices: Notices,
    pub joystick: Option<Joystick>,
}
pub type AppState = Arc<AppStateInner>;

/// Helper to create a JSON error response with a message and status code
fn json_error(message: &str, status: StatusCode) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn message(status: StatusCode, text: String) -> Response {
    (status, Json(MessageResponse { message: text })).into_response()
}

/// Creates the Axum router with all the API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/scripts", get(list_scripts))
        .route("/api/v1/scripts/{name}", put(upload_script).delete(delete_script))
        .route("/api/v1/scripts/{name}/run", post(run_script))
        .route("/api/v1/stop", post(stop_motion))
        .route("/api/v1/joystick", post(joystick_move))
        .with_state(state)
}

/// Send a request to the controller task and wait for its answer.
async fn ask<T>(
    state: &AppState,
    make: impl FnOnce(oneshot::Sender<T>) -> MotionRequest,
) -> Result<T, Response> {
    let (resp_tx, resp_rx) = oneshot::channel();
    if state.motion_tx.send(make(resp_tx)).await.is_err() {
        return Err(json_error(&ControllerError::ControllerGone.to_string(), StatusCode::INTERNAL_SERVER_ERROR));
    }
    resp_rx
        .await
        .map_err(|_| json_error(&ControllerError::ControllerGone.to_string(), StatusCode::INTERNAL_SERVER_ERROR))
}

fn store_error(error: ScriptStoreError) -> Response {
    match &error {
        ScriptStoreError::InvalidName(_) => json_error(&error.to_string(), StatusCode::BAD_REQUEST),
        ScriptStoreError::NotFound(_) => json_error(&error.to_string(), StatusCode::NOT_FOUND),
        ScriptStoreError::Io(_) => json_error(&error.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Handler to report run state and drain pending notices.
async fn get_status(State(state): State<AppState>) -> Response {
    let run = match ask(&state, |respond_to| MotionRequest::Status { respond_to }).await {
        Ok(run) => run,
        Err(response) => return response,
    };
    let joystick = match &state.joystick {
        Some(joystick) => Some(joystick.status().await),
        None => None,
    };
    let notices = state.notices.drain().await;
    Json(StatusResponse { run, notices, joystick }).into_response()
}

async fn list_scripts(State(state): State<AppState>) -> Response {
    match state.scripts.list().await {
        Ok(scripts) => Json(ScriptListResponse { scripts }).into_response(),
        Err(e) => store_error(e),
    }
}

async fn upload_script(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> Response {
    match state.scripts.save(&name, &body).await {
        Ok(_) => {
            let text = format!("File '{}' uploaded successfully!", name);
            state.notices.success(text.clone()).await;
            message(StatusCode::CREATED, text)
        }
        Err(e) => {
            state.notices.danger(e.to_string()).await;
            store_error(e)
        }
    }
}

async fn delete_script(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.scripts.delete(&name).await {
        Ok(()) => {
            let text = format!("File '{}' deleted successfully!", name);
            state.notices.success(text.clone()).await;
            message(StatusCode::OK, text)
        }
        Err(e) => {
            state.notices.danger(e.to_string()).await;
            store_error(e)
        }
    }
}

/// Handler to start executing a script in the background.
async fn run_script(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let script = name.clone();
    let result = match ask(&state, |respond_to| MotionRequest::Start { script, respond_to }).await {
        Ok(result) => result,
        Err(response) => return response,
    };
    match result {
        Ok(run_id) => (
            StatusCode::ACCEPTED,
            Json(StartResponse {
                run_id: run_id.to_string(),
                script: name,
            }),
        )
            .into_response(),
        Err(e @ ControllerError::AlreadyRunning) => json_error(&e.to_string(), StatusCode::CONFLICT),
        Err(ControllerError::Script(e)) => store_error(e),
        Err(e @ ControllerError::ControllerGone) => json_error(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Handler for the emergency stop.
async fn stop_motion(State(state): State<AppState>) -> Response {
    match ask(&state, |respond_to| MotionRequest::Stop { respond_to }).await {
        Ok(report) => Json(report).into_response(),
        Err(response) => response,
    }
}

async fn joystick_move(State(state): State<AppState>, Json(payload): Json<JoystickRequest>) -> Response {
    let Some(joystick) = &state.joystick else {
        return json_error("joystick control is disabled", StatusCode::NOT_FOUND);
    };
    if payload.action == JoystickAction::Start && payload.direction.is_none() {
        return json_error("a direction is required to start moving", StatusCode::BAD_REQUEST);
    }
    joystick.apply(payload.action, payload.direction).await;
    Json(serde_json::json!({ "status": "ok" })).into_response()
}
