//! Flash-style messages for the user, drained by the status endpoint.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

const MAX_NOTICES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub level: Level,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Shared, bounded queue of notices. Oldest entries are dropped first.
#[derive(Debug, Clone, Default)]
pub struct Notices {
    inner: Arc<Mutex<VecDeque<Notice>>>,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, level: Level, message: impl Into<String>) {
        let mut queue = self.inner.lock().await;
        if queue.len() == MAX_NOTICES {
            queue.pop_front();
        }
        queue.push_back(Notice {
            level,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.push(Level::Info, message).await;
    }

    pub async fn success(&self, message: impl Into<String>) {
        self.push(Level::Success, message).await;
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.push(Level::Warning, message).await;
    }

    pub async fn danger(&self, message: impl Into<String>) {
        self.push(Level::Danger, message).await;
    }

    /// Remove and return everything queued so far.
    pub async fn drain(&self) -> Vec<Notice> {
        self.inner.lock().await.drain(..).collect()
    }

    /// Copy of the queue without consuming it.
    pub async fn snapshot(&self) -> Vec<Notice> {
        self.inner.lock().await.iter().cloned().collect()
    }
}
