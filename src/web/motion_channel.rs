//! Defines the communication channel messages between the web server and the motion controller task.

use crate::motion::{ControllerError, RunStatus, StopReport};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Represents a request sent from a web handler to the motion controller task.
#[derive(Debug)]
pub enum MotionRequest {
    /// Start running an uploaded script.
    Start {
        script: String,
        respond_to: oneshot::Sender<Result<Uuid, ControllerError>>,
    },
    /// Stop the controller and any run in progress.
    Stop {
        respond_to: oneshot::Sender<StopReport>,
    },
    /// Report the state of the most recent run.
    Status {
        respond_to: oneshot::Sender<RunStatus>,
    },
}
