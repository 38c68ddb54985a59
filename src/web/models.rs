//! Contains the data models for API requests and responses.

use crate::file_manager::FileInfo;
use crate::joystick::{JoystickAction, JoystickStatus};
use crate::motion::RunStatus;
use crate::notices::Notice;
use serde::{Deserialize, Serialize};

/// Represents the response for the /api/v1/status endpoint.
#[derive(Serialize, Debug)]
pub struct StatusResponse {
    pub run: RunStatus,
    /// Flash messages queued since the previous status call.
    pub notices: Vec<Notice>,
    pub joystick: Option<JoystickStatus>,
}

#[derive(Serialize, Debug)]
pub struct ScriptListResponse {
    pub scripts: Vec<FileInfo>,
}

#[derive(Serialize, Debug)]
pub struct StartResponse {
    pub run_id: String,
    pub script: String,
}

/// Represents a joystick button press or release.
#[derive(Deserialize, Debug)]
pub struct JoystickRequest {
    pub direction: Option<String>,
    pub action: JoystickAction,
}

#[derive(Serialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}
