// src/motion/ack.rs - Wait for the controller's completion marker
use super::{CancelFlag, MotionError};
use crate::hardware::SerialLink;
use crate::protocol::{COMPLETION_MARKER, STOP_FRAME};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Completed,
    TimedOut,
}

/// Block until the controller reports completion, `timeout` elapses, or
/// a stop is requested.
///
/// Input is accumulated across reads and searched for the marker as a
/// substring, so a marker split over several reads still counts. A stop
/// request writes the stop frame and returns [`MotionError::Cancelled`].
pub async fn await_completion(
    link: &mut dyn SerialLink,
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancelFlag,
) -> Result<AckOutcome, MotionError> {
    let deadline = Instant::now() + timeout;
    let mut received = String::new();

    loop {
        if cancel.is_set() {
            tracing::warn!("Stop requested while waiting for completion");
            send_stop(link).await;
            return Err(MotionError::Cancelled);
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!("Timeout waiting for '{}' after {:?}", COMPLETION_MARKER, timeout);
            return Ok(AckOutcome::TimedOut);
        }
        let window = poll_interval.min(deadline - now);
        let poll_started = now;

        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => continue,
            chunk = link.read_available(window) => chunk?,
        };
        if chunk.is_empty() {
            // A hung-up tty returns empty reads at once; keep to the poll rate.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = sleep_until(poll_started + window) => {}
            }
            continue;
        }

        let text = decode_permissive(&chunk);
        tracing::debug!("Received: {}", text.trim());
        received.push_str(&text);

        if received.contains(COMPLETION_MARKER) {
            tracing::debug!("Movement completed - '{}' received", COMPLETION_MARKER);
            return Ok(AckOutcome::Completed);
        }
    }
}

/// Best-effort stop on the engine's own link. The stop path also sends
/// one over a separate connection, so a failure here is only logged.
pub(crate) async fn send_stop(link: &mut dyn SerialLink) {
    match link.write_all(STOP_FRAME).await {
        Ok(()) => tracing::info!("Stop command sent to controller"),
        Err(e) => tracing::warn!("Failed to send stop command: {}", e),
    }
}

// Invalid UTF-8 is dropped rather than replaced.
fn decode_permissive(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect()
}
