// src/motion/controller.rs - Start/stop coordination for script runs
use super::engine::{RunSettings, RunState, RunStatus, ScriptRunner};
use super::{CancelFlag, MotionError, RunOutcome};
use crate::config::Config;
use crate::file_manager::{ScriptStore, ScriptStoreError};
use crate::hardware::SerialConnector;
use crate::notices::Notices;
use crate::protocol::STOP_FRAME;
use crate::web::motion_channel::MotionRequest;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Another execution is already running.")]
    AlreadyRunning,
    #[error(transparent)]
    Script(#[from] ScriptStoreError),
    #[error("motion controller task is not running")]
    ControllerGone,
}

/// What `stop` managed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopReport {
    /// The stop frame reached the device over the auxiliary connection.
    pub stop_sent: bool,
    /// A run was in progress when the stop arrived.
    pub was_running: bool,
    /// The run did not unwind within the grace period and was aborted.
    pub forced: bool,
}

/// Owns the single live run and the shared stop flag.
///
/// All mutation happens through `&mut self`, so the one-run-at-a-time
/// check and the task handle have a single writer: the controller task.
pub struct ExecutionController {
    connector: Arc<dyn SerialConnector>,
    settings: RunSettings,
    stop_grace: Duration,
    scripts: ScriptStore,
    cancel: Arc<CancelFlag>,
    status: Arc<RwLock<RunStatus>>,
    notices: Notices,
    task: Option<JoinHandle<RunOutcome>>,
}

impl ExecutionController {
    pub fn new(config: &Config, connector: Arc<dyn SerialConnector>, scripts: ScriptStore, notices: Notices) -> Self {
        Self {
            connector,
            settings: RunSettings::from_config(config),
            stop_grace: config.motion.stop_grace(),
            scripts,
            cancel: Arc::new(CancelFlag::new()),
            status: Arc::new(RwLock::new(RunStatus::default())),
            notices,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn cancel_flag(&self) -> Arc<CancelFlag> {
        self.cancel.clone()
    }

    pub async fn status(&self) -> RunStatus {
        self.status.read().await.clone()
    }

    /// Start running `script` in the background.
    ///
    /// Rejected while a previous run is still alive; the live run is left untouched.
    pub async fn start(&mut self, script: &str) -> Result<Uuid, ControllerError> {
        if self.is_running() {
            tracing::warn!("Rejected start of '{}': a run is already in progress", script);
            self.notices.warning(ControllerError::AlreadyRunning.to_string()).await;
            return Err(ControllerError::AlreadyRunning);
        }
        let path = match self.scripts.resolve(script) {
            Ok(path) => path,
            Err(e) => {
                self.notices.danger(e.to_string()).await;
                return Err(e.into());
            }
        };

        // Reap the previous, already finished, run.
        if let Some(previous) = self.task.take() {
            let _ = previous.await;
        }

        self.cancel.reset();
        let run_id = Uuid::new_v4();
        *self.status.write().await = RunStatus::running(run_id.to_string(), script.to_string());

        let runner = ScriptRunner::new(
            self.connector.clone(),
            self.settings.clone(),
            self.cancel.clone(),
            self.status.clone(),
            self.notices.clone(),
        );
        self.task = Some(tokio::spawn(runner.run(path)));

        tracing::info!("Run {} started for '{}'", run_id, script);
        self.notices.info(format!("Started executing '{}'", script)).await;
        Ok(run_id)
    }

    /// Stop the controller and end any run in progress.
    ///
    /// The flag is raised first, then a stop frame goes out on a short-lived
    /// connection of its own, whatever state the run is in. A run that has not
    /// unwound within the grace period is aborted; its link is released when
    /// the task drops it. Safe to call with nothing running.
    pub async fn stop(&mut self) -> StopReport {
        // Sampled before the flag goes up; the run may unwind during the I/O below.
        let was_running = self.is_running();
        self.cancel.set();
        tracing::warn!("Stop signal received from user");

        let stop_sent = emergency_stop(self.connector.as_ref(), &self.settings.port, self.settings.baud).await;

        let mut report = StopReport {
            stop_sent,
            was_running,
            forced: false,
        };

        if let Some(mut task) = self.task.take() {
            if !task.is_finished() {
                match tokio::time::timeout(self.stop_grace, &mut task).await {
                    Ok(_) => tracing::info!("Run unwound after stop request"),
                    Err(_) => {
                        tracing::warn!("Run did not stop within {:?}; aborting task", self.stop_grace);
                        task.abort();
                        let _ = task.await;
                        report.forced = true;
                        self.status.write().await.finish(RunState::Cancelled, None);
                        self.notices.warning(MotionError::Cancelled.user_message()).await;
                    }
                }
            }
        }

        self.notices.warning("Emergency stop: motion halted immediately.").await;
        report
    }

    /// Serve requests from the HTTP layer until every sender is dropped,
    /// then stop whatever is still running.
    pub async fn serve(mut self, mut requests: mpsc::Receiver<MotionRequest>) {
        while let Some(request) = requests.recv().await {
            match request {
                MotionRequest::Start { script, respond_to } => {
                    let result = self.start(&script).await;
                    let _ = respond_to.send(result);
                }
                MotionRequest::Stop { respond_to } => {
                    let report = self.stop().await;
                    let _ = respond_to.send(report);
                }
                MotionRequest::Status { respond_to } => {
                    let mut status = self.status().await;
                    // A task that died without reporting (panic) still reads as stopped.
                    if status.state == RunState::Running && !self.is_running() {
                        status.state = RunState::Failed;
                    }
                    let _ = respond_to.send(status);
                }
            }
        }

        if self.is_running() {
            tracing::info!("Controller shutting down; stopping active run");
            self.stop().await;
        }
    }
}

/// Write the stop frame over a dedicated connection, independent of any run.
pub async fn emergency_stop(connector: &dyn SerialConnector, port: &str, baud: u32) -> bool {
    let mut link = match connector.open(port, baud).await {
        Ok(link) => link,
        Err(e) => {
            tracing::error!("Error sending stop signal to controller: {}", e);
            return false;
        }
    };
    let sent = match link.write_all(STOP_FRAME).await {
        Ok(()) => {
            tracing::info!("Emergency stop signal sent to controller");
            true
        }
        Err(e) => {
            tracing::error!("Error sending stop signal to controller: {}", e);
            false
        }
    };
    link.close().await;
    sent
}
