// src/motion/mod.rs - Script execution against the motion controller

pub mod ack;
pub mod cancel;
pub mod controller;
pub mod engine;

pub use ack::{await_completion, AckOutcome};
pub use cancel::CancelFlag;
pub use controller::{ControllerError, ExecutionController, StopReport};
pub use engine::{RunOutcome, RunSettings, RunState, RunStatus, ScriptRunner};

use crate::hardware::SerialError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Reasons a run leaves the `Running` state.
#[derive(Debug, Error)]
pub enum MotionError {
    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),
    #[error("cannot read script '{}': {source}", path.display())]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("script '{}' contains no runnable operations", path.display())]
    EmptyScript { path: PathBuf },
    #[error("no completion from controller within {timeout:?} after '{command}'")]
    AckTimeout { command: String, timeout: Duration },
    /// Deliberate unwind after a stop request; not a failure.
    #[error("stopped by user")]
    Cancelled,
}

impl MotionError {
    /// Message shown to the user when a run ends with this error.
    pub fn user_message(&self) -> String {
        match self {
            MotionError::Serial(e) => format!("Serial error: {}", e),
            MotionError::ScriptRead { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
                format!("File '{}' not found.", path.display())
            }
            MotionError::AckTimeout { command, .. } => {
                format!("Movement command '{}' failed: no completion from controller.", command)
            }
            MotionError::Cancelled => "Motion execution stopped.".to_string(),
            other => format!("Unexpected error: {}", other),
        }
    }
}
