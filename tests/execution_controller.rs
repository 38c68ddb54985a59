// Integration tests for run start/stop coordination

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use text_motion::config::Config;
use text_motion::file_manager::{ScriptStore, ScriptStoreError};
use text_motion::hardware::{SerialConnector, SerialError, SerialLink};
use text_motion::motion::{ControllerError, ExecutionController, RunState};
use text_motion::notices::{Level, Notices};
use text_motion::protocol;
use text_motion::simulator::SimulatedController;
use text_motion::web::motion_channel::MotionRequest;
use tokio::sync::{mpsc, oneshot};

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.serial.port = "sim".to_string();
    config.scripts.directory = dir.path().display().to_string();
    config.motion.ack_timeout_ms = 1_000;
    config.motion.poll_interval_ms = 5;
    config.motion.stop_grace_ms = 200;
    config
}

async fn setup(connector: Arc<dyn SerialConnector>) -> (TempDir, ExecutionController, Notices) {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let scripts = ScriptStore::new(dir.path());
    scripts.save("hold.txt", b"wait:30").await.unwrap();
    scripts.save("square.txt", b"turn:90\nmove:50").await.unwrap();
    let notices = Notices::new();
    let controller = ExecutionController::new(&config, connector, scripts, notices.clone());
    (dir, controller, notices)
}

#[tokio::test]
async fn test_second_start_is_rejected_while_running() {
    let sim = SimulatedController::new();
    let (_dir, mut controller, notices) = setup(Arc::new(sim.clone())).await;

    let first = controller.start("hold.txt").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(controller.is_running());

    let second = controller.start("square.txt").await;
    assert!(matches!(second, Err(ControllerError::AlreadyRunning)));
    assert!(controller.is_running());
    assert!(!controller.cancel_flag().is_set());

    let status = controller.status().await;
    assert_eq!(status.state, RunState::Running);
    assert_eq!(status.run_id, Some(first.to_string()));
    assert_eq!(status.script.as_deref(), Some("hold.txt"));
    // The rejected start sent nothing to the device.
    assert!(sim.frame_texts().is_empty());

    let notices = notices.drain().await;
    assert!(notices
        .iter()
        .any(|n| n.level == Level::Warning && n.message == "Another execution is already running."));

    controller.stop().await;
}

#[tokio::test]
async fn test_stop_ends_run_cooperatively() {
    let sim = SimulatedController::new();
    let (_dir, mut controller, _notices) = setup(Arc::new(sim.clone())).await;

    controller.start("hold.txt").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = controller.stop().await;
    assert!(report.stop_sent);
    assert!(report.was_running);
    assert!(!report.forced);
    assert!(!controller.is_running());
    assert_eq!(controller.status().await.state, RunState::Cancelled);

    // One stop from the auxiliary connection and one from the run itself.
    assert_eq!(sim.stop_count(), 2);
    assert_eq!(sim.open_links(), 0);
}

#[tokio::test]
async fn test_stop_without_run_still_reaches_device() {
    let sim = SimulatedController::new();
    let (_dir, mut controller, notices) = setup(Arc::new(sim.clone())).await;

    let report = controller.stop().await;
    assert!(report.stop_sent);
    assert!(!report.was_running);
    let again = controller.stop().await;
    assert!(again.stop_sent);

    assert_eq!(sim.frame_texts(), vec!["s", "s"]);
    assert_eq!(sim.open_links(), 0);
    let notices = notices.drain().await;
    assert_eq!(
        notices.iter().filter(|n| n.message == "Emergency stop: motion halted immediately.").count(),
        2
    );
}

#[tokio::test]
async fn test_stop_reports_unreachable_device() {
    let sim = SimulatedController::new();
    sim.refuse_connections(true);
    let (_dir, mut controller, _notices) = setup(Arc::new(sim.clone())).await;

    let report = controller.stop().await;
    assert!(!report.stop_sent);
    assert!(controller.cancel_flag().is_set());
}

#[tokio::test]
async fn test_start_after_stop_runs_again() {
    let sim = SimulatedController::new();
    let (_dir, mut controller, _notices) = setup(Arc::new(sim.clone())).await;

    controller.start("hold.txt").await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    controller.stop().await;

    controller.start("square.txt").await.unwrap();
    assert!(!controller.cancel_flag().is_set());
    let sent_before = sim.frame_texts().len();
    assert!(sim.wait_for_frames(sent_before + 4, Duration::from_secs(2)).await);
    let frames = sim.frame_texts();
    assert_eq!(&frames[sent_before..sent_before + 4], &["a 90\r\n", "d 50\r\n", "a 90\r\n", "d 50\r\n"]);

    controller.stop().await;
    assert_eq!(controller.status().await.state, RunState::Cancelled);
}

#[tokio::test]
async fn test_invalid_script_name_is_rejected() {
    let sim = SimulatedController::new();
    let (_dir, mut controller, _notices) = setup(Arc::new(sim.clone())).await;

    let result = controller.start("../etc/passwd").await;
    assert!(matches!(result, Err(ControllerError::Script(ScriptStoreError::InvalidName(_)))));
    assert!(!controller.is_running());
    assert_eq!(sim.connections_opened(), 0);
}

/// Device whose motion writes never complete, to wedge a run outside
/// any cancellation checkpoint.
#[derive(Clone, Default)]
struct WedgedDevice {
    open_links: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

struct WedgedLink {
    device: WedgedDevice,
}

#[async_trait]
impl SerialConnector for WedgedDevice {
    async fn open(&self, _port: &str, _baud: u32) -> Result<Box<dyn SerialLink>, SerialError> {
        self.open_links.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(WedgedLink { device: self.clone() }))
    }
}

#[async_trait]
impl SerialLink for WedgedLink {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        if protocol::is_motion(bytes) {
            std::future::pending::<()>().await;
        }
        if protocol::is_stop(bytes) {
            self.device.stops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn read_available(&mut self, wait: Duration) -> Result<Vec<u8>, SerialError> {
        tokio::time::sleep(wait).await;
        Ok(Vec::new())
    }

    fn clear_buffers(&mut self) -> Result<(), SerialError> {
        Ok(())
    }

    async fn close(&mut self) {}

    fn is_open(&self) -> bool {
        true
    }
}

impl Drop for WedgedLink {
    fn drop(&mut self) {
        self.device.open_links.fetch_sub(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_wedged_run_is_aborted_and_releases_link() {
    let device = WedgedDevice::default();
    let (_dir, mut controller, notices) = setup(Arc::new(device.clone())).await;

    controller.start("square.txt").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(device.open_links.load(Ordering::SeqCst), 1);

    let report = controller.stop().await;
    assert!(report.stop_sent);
    assert!(report.forced);
    assert!(!controller.is_running());
    assert_eq!(controller.status().await.state, RunState::Cancelled);
    assert_eq!(device.stops.load(Ordering::SeqCst), 1);
    assert_eq!(device.open_links.load(Ordering::SeqCst), 0);

    // Same flash messages as a cooperative stop.
    let messages: Vec<String> = notices.drain().await.into_iter().map(|n| n.message).collect();
    assert!(messages.iter().any(|m| m == "Motion execution stopped."));
    assert!(messages.iter().any(|m| m == "Emergency stop: motion halted immediately."));
}

/// Simulated device whose connections after the first take a while to open.
#[derive(Clone)]
struct SlowSecondOpen {
    sim: SimulatedController,
    opens: Arc<AtomicUsize>,
    delay: Duration,
}

#[async_trait]
impl SerialConnector for SlowSecondOpen {
    async fn open(&self, port: &str, baud: u32) -> Result<Box<dyn SerialLink>, SerialError> {
        if self.opens.fetch_add(1, Ordering::SeqCst) > 0 {
            tokio::time::sleep(self.delay).await;
        }
        self.sim.open(port, baud).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_reports_run_that_unwinds_during_emergency_stop() {
    let sim = SimulatedController::new();
    let connector = SlowSecondOpen {
        sim: sim.clone(),
        opens: Arc::new(AtomicUsize::new(0)),
        delay: Duration::from_millis(50),
    };
    let (_dir, mut controller, _notices) = setup(Arc::new(connector)).await;

    controller.start("hold.txt").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(controller.is_running());

    let report = controller.stop().await;
    assert!(report.was_running);
    assert!(report.stop_sent);
    assert!(!report.forced);
    assert_eq!(controller.status().await.state, RunState::Cancelled);
}

#[tokio::test]
async fn test_serve_handles_requests_over_channel() {
    let sim = SimulatedController::new();
    let (_dir, controller, _notices) = setup(Arc::new(sim.clone())).await;
    let (tx, rx) = mpsc::channel(8);
    let serve = tokio::spawn(controller.serve(rx));

    let (resp_tx, resp_rx) = oneshot::channel();
    tx.send(MotionRequest::Start { script: "hold.txt".to_string(), respond_to: resp_tx })
        .await
        .unwrap();
    let run_id = resp_rx.await.unwrap().unwrap();

    let (resp_tx, resp_rx) = oneshot::channel();
    tx.send(MotionRequest::Status { respond_to: resp_tx }).await.unwrap();
    let status = resp_rx.await.unwrap();
    assert_eq!(status.state, RunState::Running);
    assert_eq!(status.run_id, Some(run_id.to_string()));

    let (resp_tx, resp_rx) = oneshot::channel();
    tx.send(MotionRequest::Stop { respond_to: resp_tx }).await.unwrap();
    assert!(resp_rx.await.unwrap().was_running);

    drop(tx);
    serve.await.unwrap();
    assert_eq!(sim.open_links(), 0);
}
