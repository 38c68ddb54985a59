// src/motion/cancel.rs - Shared stop request flag
use tokio::sync::watch;

/// Process-wide stop request shared by the stop path and the running script.
///
/// Reads and writes go through a `watch` channel, so the flag is safe to
/// touch from any task and waiters wake as soon as it is raised.
#[derive(Debug)]
pub struct CancelFlag {
    tx: watch::Sender<bool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Raise the flag. Idempotent.
    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    /// Lower the flag before a new run starts.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the flag is raised; immediately if it already is.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_set_and_reset() {
        let flag = CancelFlag::new();
        assert!(!flag.is_set());
        flag.set();
        flag.set();
        assert!(flag.is_set());
        flag.reset();
        assert!(!flag.is_set());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let flag = Arc::new(CancelFlag::new());
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        flag.set();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter did not wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_when_already_set() {
        let flag = CancelFlag::new();
        flag.set();
        tokio::time::timeout(Duration::from_millis(100), flag.cancelled())
            .await
            .expect("already-raised flag should resolve immediately");
    }
}
