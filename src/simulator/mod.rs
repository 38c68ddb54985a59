//! In-memory stand-in for the motion controller.
//!
//! Speaks the same line protocol as the firmware: every turn/move frame is
//! answered with a completion reply after an optional delay. Used by the
//! test suite and by `motion-host --simulate`.

use crate::hardware::{SerialConnector, SerialError, SerialLink};
use crate::protocol;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

/// A frame written by the host, stamped with the time it arrived.
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub bytes: Vec<u8>,
    pub at: Instant,
}

impl SentFrame {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Debug)]
struct PendingChunk {
    bytes: Vec<u8>,
    ready_at: Instant,
}

#[derive(Debug)]
struct SimState {
    frames: Vec<SentFrame>,
    pending: VecDeque<PendingChunk>,
    /// Chunks sent back after each motion frame; empty means silence.
    reply: Vec<Vec<u8>>,
    reply_delay: Duration,
    refuse_connections: bool,
    fail_writes: bool,
    connections_opened: usize,
    open_links: usize,
    buffer_clears: usize,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            pending: VecDeque::new(),
            reply: vec![b"Done\r\n".to_vec()],
            reply_delay: Duration::ZERO,
            refuse_connections: false,
            fail_writes: false,
            connections_opened: 0,
            open_links: 0,
            buffer_clears: 0,
        }
    }
}

/// Shared handle to one simulated device. Clones observe the same device.
#[derive(Debug, Clone, Default)]
pub struct SimulatedController {
    state: Arc<Mutex<SimState>>,
    input: Arc<Notify>,
}

impl SimulatedController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delay between a motion frame and its reply.
    pub fn with_reply_delay(self, delay: Duration) -> Self {
        self.lock().reply_delay = delay;
        self
    }

    /// Reply with these chunks, each delivered by a separate read.
    pub fn set_reply(&self, chunks: &[&[u8]]) {
        self.lock().reply = chunks.iter().map(|c| c.to_vec()).collect();
    }

    /// Never acknowledge motion frames.
    pub fn silence(&self) {
        self.lock().reply.clear();
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Queue unsolicited input for the next read.
    pub fn inject(&self, bytes: &[u8]) {
        self.lock().pending.push_back(PendingChunk {
            bytes: bytes.to_vec(),
            ready_at: Instant::now(),
        });
        self.input.notify_waiters();
    }

    pub fn frames(&self) -> Vec<SentFrame> {
        self.lock().frames.clone()
    }

    pub fn frame_texts(&self) -> Vec<String> {
        self.lock().frames.iter().map(SentFrame::text).collect()
    }

    pub fn stop_count(&self) -> usize {
        self.lock().frames.iter().filter(|f| protocol::is_stop(&f.bytes)).count()
    }

    pub fn connections_opened(&self) -> usize {
        self.lock().connections_opened
    }

    /// Links opened and not yet closed or dropped.
    pub fn open_links(&self) -> usize {
        self.lock().open_links
    }

    pub fn buffer_clears(&self) -> usize {
        self.lock().buffer_clears
    }

    /// Wait until at least `count` frames were written, or give up after `timeout`.
    pub async fn wait_for_frames(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.lock().frames.len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.lock().frames.len() >= count
    }
}

#[async_trait]
impl SerialConnector for SimulatedController {
    async fn open(&self, port: &str, baud: u32) -> Result<Box<dyn SerialLink>, SerialError> {
        let mut state = self.lock();
        if state.refuse_connections {
            return Err(SerialError::Connection {
                port: port.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "simulated device unavailable"),
            });
        }
        state.connections_opened += 1;
        state.open_links += 1;
        tracing::debug!("Simulated controller opened on {} at {} baud", port, baud);
        Ok(Box::new(SimulatedLink {
            device: self.clone(),
            open: true,
        }))
    }

    fn available_ports(&self) -> Vec<String> {
        vec!["simulated".to_string()]
    }
}

struct SimulatedLink {
    device: SimulatedController,
    open: bool,
}

impl SimulatedLink {
    fn release(&mut self) {
        if self.open {
            self.open = false;
            let mut state = self.device.lock();
            state.open_links = state.open_links.saturating_sub(1);
        }
    }
}

#[async_trait]
impl SerialLink for SimulatedLink {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        if !self.open {
            return Err(SerialError::Closed);
        }
        {
            let mut state = self.device.lock();
            if state.fail_writes {
                return Err(SerialError::Write(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "simulated write failure",
                )));
            }
            let now = Instant::now();
            state.frames.push(SentFrame {
                bytes: bytes.to_vec(),
                at: now,
            });
            if protocol::is_motion(bytes) {
                let ready_at = now + state.reply_delay;
                let reply = state.reply.clone();
                state
                    .pending
                    .extend(reply.into_iter().map(|bytes| PendingChunk { bytes, ready_at }));
            }
        }
        self.device.input.notify_waiters();
        Ok(())
    }

    async fn read_available(&mut self, wait: Duration) -> Result<Vec<u8>, SerialError> {
        if !self.open {
            return Err(SerialError::Closed);
        }
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.device.input.notified();
            let next_ready = {
                let mut state = self.device.lock();
                match state.pending.front() {
                    Some(chunk) if chunk.ready_at <= Instant::now() => {
                        let chunk = state.pending.pop_front().map(|c| c.bytes).unwrap_or_default();
                        return Ok(chunk);
                    }
                    Some(chunk) => Some(chunk.ready_at),
                    None => None,
                }
            };
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            let until = next_ready.map_or(deadline, |ready| ready.min(deadline));
            tokio::select! {
                _ = sleep_until(until) => {}
                _ = notified => {}
            }
        }
    }

    fn clear_buffers(&mut self) -> Result<(), SerialError> {
        let mut state = self.device.lock();
        state.pending.clear();
        state.buffer_clears += 1;
        Ok(())
    }

    async fn close(&mut self) {
        self.release();
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for SimulatedLink {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_motion_frames_are_acknowledged() {
        let sim = SimulatedController::new();
        let mut link = sim.open("sim", 115_200).await.unwrap();
        link.write_all(b"a 90\r\n").await.unwrap();
        let reply = link.read_available(Duration::from_millis(50)).await.unwrap();
        assert_eq!(reply, b"Done\r\n");
        link.write_all(b"s").await.unwrap();
        assert!(link.read_available(Duration::from_millis(20)).await.unwrap().is_empty());
        assert_eq!(sim.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_close_and_drop_release_link() {
        let sim = SimulatedController::new();
        let mut first = sim.open("sim", 115_200).await.unwrap();
        let second = sim.open("sim", 115_200).await.unwrap();
        assert_eq!(sim.open_links(), 2);
        first.close().await;
        first.close().await;
        assert_eq!(sim.open_links(), 1);
        drop(second);
        assert_eq!(sim.open_links(), 0);
        assert_eq!(sim.connections_opened(), 2);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let sim = SimulatedController::new();
        sim.refuse_connections(true);
        assert!(matches!(sim.open("sim", 9600).await, Err(SerialError::Connection { .. })));
    }
}
