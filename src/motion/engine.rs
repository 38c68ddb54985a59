// src/motion/engine.rs - Script execution state machine
use super::ack::{await_completion, send_stop, AckOutcome};
use super::{CancelFlag, MotionError};
use crate::config::Config;
use crate::hardware::{SerialConnector, SerialLink};
use crate::notices::Notices;
use crate::script::{self, Operation};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Observable state of the most recent run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub state: RunState,
    pub run_id: Option<String>,
    pub script: Option<String>,
    pub loops_completed: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            run_id: None,
            script: None,
            loops_completed: 0,
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }
}

impl RunStatus {
    pub fn running(run_id: String, script: String) -> Self {
        Self {
            state: RunState::Running,
            run_id: Some(run_id),
            script: Some(script),
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn finish(&mut self, state: RunState, error: Option<String>) {
        self.state = state;
        self.finished_at = Some(Utc::now());
        self.last_error = error;
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Only reachable when a loop bound is configured.
    Completed { loops: u32 },
    Failed(MotionError),
    Cancelled,
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        match self {
            RunOutcome::Completed { .. } => RunState::Completed,
            RunOutcome::Failed(_) => RunState::Failed,
            RunOutcome::Cancelled => RunState::Cancelled,
        }
    }
}

/// Connection and timing parameters for one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub port: String,
    pub baud: u32,
    pub ack_timeout: Duration,
    pub poll_interval: Duration,
    pub max_loops: Option<u32>,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.serial.port.clone(),
            baud: config.serial.baud,
            ack_timeout: config.motion.ack_timeout(),
            poll_interval: config.motion.poll_interval(),
            max_loops: config.motion.max_loops,
        }
    }
}

/// Executes one script file against the controller until it is stopped,
/// fails, or reaches the configured loop bound.
pub struct ScriptRunner {
    connector: Arc<dyn SerialConnector>,
    settings: RunSettings,
    cancel: Arc<CancelFlag>,
    status: Arc<RwLock<RunStatus>>,
    notices: Notices,
}

impl ScriptRunner {
    pub fn new(
        connector: Arc<dyn SerialConnector>,
        settings: RunSettings,
        cancel: Arc<CancelFlag>,
        status: Arc<RwLock<RunStatus>>,
        notices: Notices,
    ) -> Self {
        Self {
            connector,
            settings,
            cancel,
            status,
            notices,
        }
    }

    /// Run the script at `path`. Every error is folded into the outcome;
    /// the link is closed on every exit path, and dropped if the task is aborted.
    pub async fn run(self, path: PathBuf) -> RunOutcome {
        tracing::info!("Starting script run for {}", path.display());

        let outcome = match self.connector.open(&self.settings.port, self.settings.baud).await {
            Ok(mut link) => {
                let result = self.drive(link.as_mut(), &path).await;
                link.close().await;
                match result {
                    Ok(loops) => RunOutcome::Completed { loops },
                    Err(MotionError::Cancelled) => RunOutcome::Cancelled,
                    Err(e) => RunOutcome::Failed(e),
                }
            }
            Err(e) => RunOutcome::Failed(e.into()),
        };

        self.report(&outcome).await;
        outcome
    }

    async fn drive(&self, link: &mut dyn SerialLink, path: &Path) -> Result<u32, MotionError> {
        link.clear_buffers()?;
        let mut loops = 0u32;

        loop {
            if self.settings.max_loops.is_some_and(|max| loops >= max) {
                return Ok(loops);
            }
            if self.cancel.is_set() {
                tracing::warn!("Stop requested: aborting before loop {}", loops + 1);
                send_stop(link).await;
                return Err(MotionError::Cancelled);
            }

            tracing::info!("Starting loop {}", loops + 1);
            let parsed = read_script(path).await?;
            if parsed.script.is_empty() {
                return Err(MotionError::EmptyScript { path: path.to_path_buf() });
            }
            tracing::debug!(
                "Loop {}: {} operations, {} motion commands",
                loops + 1,
                parsed.script.len(),
                parsed.script.motion_count()
            );

            for operation in &parsed.script {
                self.execute(link, operation).await?;
            }

            loops += 1;
            self.status.write().await.loops_completed = loops;
            tracing::info!("All commands in loop {} completed", loops);
        }
    }

    async fn execute(&self, link: &mut dyn SerialLink, operation: &Operation) -> Result<(), MotionError> {
        if self.cancel.is_set() {
            tracing::warn!("Stop requested: aborting commands");
            send_stop(link).await;
            return Err(MotionError::Cancelled);
        }

        match operation {
            Operation::Move { .. } | Operation::Turn { .. } => {
                let Some(frame) = operation.command_frame() else {
                    return Ok(());
                };
                let command = frame.trim_end().to_string();
                tracing::debug!("Sending movement command: {}", command);
                link.write_all(frame.as_bytes()).await?;

                match await_completion(link, self.settings.ack_timeout, self.settings.poll_interval, &self.cancel).await? {
                    AckOutcome::Completed => Ok(()),
                    AckOutcome::TimedOut => Err(MotionError::AckTimeout {
                        command,
                        timeout: self.settings.ack_timeout,
                    }),
                }
            }
            Operation::Wait { seconds } => {
                let duration = operation.wait_duration().unwrap_or_default();
                tracing::debug!("Waiting for {} seconds", seconds);
                tokio::select! {
                    _ = tokio::time::sleep(duration) => Ok(()),
                    _ = self.cancel.cancelled() => {
                        tracing::warn!("Stop requested during wait");
                        send_stop(link).await;
                        Err(MotionError::Cancelled)
                    }
                }
            }
        }
    }

    async fn report(&self, outcome: &RunOutcome) {
        let error = match outcome {
            RunOutcome::Completed { loops } => {
                tracing::info!("Script finished after {} loops", loops);
                self.notices.success(format!("Script finished after {} loops.", loops)).await;
                None
            }
            RunOutcome::Cancelled => {
                tracing::info!("Execution stopped");
                self.notices.warning(MotionError::Cancelled.user_message()).await;
                None
            }
            RunOutcome::Failed(e) => {
                tracing::error!("Script run failed: {}", e);
                self.notices.danger(e.user_message()).await;
                Some(e.to_string())
            }
        };
        self.status.write().await.finish(outcome.state(), error);
    }
}

async fn read_script(path: &Path) -> Result<script::ParsedScript, MotionError> {
    let source = tokio::fs::read_to_string(path).await.map_err(|source| MotionError::ScriptRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(script::parse_str(&source))
}
