//! Joystick pusher: resends the held direction at a fixed rate.
//!
//! Unlike script runs, the joystick link is kept open and re-opened
//! forever after any open or write failure.

use crate::config::Config;
use crate::hardware::{SerialConnector, SerialLink};
use crate::protocol;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoystickAction {
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoystickStatus {
    pub sending: bool,
    pub command: Option<String>,
    pub connected: bool,
}

#[derive(Default)]
struct JoystickState {
    sending: bool,
    command: Option<String>,
    link: Option<Box<dyn SerialLink>>,
}

#[derive(Clone)]
pub struct Joystick {
    state: Arc<Mutex<JoystickState>>,
    connector: Arc<dyn SerialConnector>,
    port: String,
    baud: u32,
    send_interval: Duration,
    reconnect_delay: Duration,
}

impl Joystick {
    pub fn new(config: &Config, connector: Arc<dyn SerialConnector>) -> Self {
        Self {
            state: Arc::new(Mutex::new(JoystickState::default())),
            connector,
            port: config.joystick_port().to_string(),
            baud: config.serial.baud,
            send_interval: config.joystick.send_interval(),
            reconnect_delay: config.joystick.reconnect_delay(),
        }
    }

    /// Start the background sender. It owns reconnection as well.
    pub fn spawn(&self) -> JoinHandle<()> {
        let joystick = self.clone();
        tokio::spawn(async move { joystick.send_loop().await })
    }

    /// Apply a start/stop action from the UI.
    ///
    /// `Start` with a direction begins continuous sending; `Stop` clears the
    /// direction and sends the stop line immediately if a link is up.
    pub async fn apply(&self, action: JoystickAction, direction: Option<String>) {
        tracing::info!("Joystick action: {:?}, direction: {:?}", action, direction);
        let mut state = self.state.lock().await;
        match action {
            JoystickAction::Start => {
                state.sending = direction.is_some();
                state.command = direction;
            }
            JoystickAction::Stop => {
                state.sending = false;
                state.command = None;
                if let Some(link) = state.link.as_mut() {
                    match link.write_all(protocol::STOP_LINE).await {
                        Ok(()) => tracing::debug!("Sent: s (stop)"),
                        Err(e) => {
                            tracing::warn!("Stop command failed: {}", e);
                            drop_link(&mut state).await;
                        }
                    }
                }
            }
        }
    }

    pub async fn status(&self) -> JoystickStatus {
        let state = self.state.lock().await;
        JoystickStatus {
            sending: state.sending,
            command: state.command.clone(),
            connected: state.link.as_ref().is_some_and(|link| link.is_open()),
        }
    }

    async fn send_loop(&self) {
        let mut ticker = tokio::time::interval(self.send_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let connected = self.state.lock().await.link.is_some();
            if !connected {
                let link = self.connect().await;
                self.state.lock().await.link = Some(link);
                continue;
            }

            let mut state = self.state.lock().await;
            if !state.sending {
                continue;
            }
            let Some(command) = state.command.clone() else {
                continue;
            };
            let frame = protocol::command_line(&command);
            let Some(link) = state.link.as_mut() else {
                continue;
            };
            match link.write_all(frame.as_bytes()).await {
                Ok(()) => tracing::debug!("Sent: {}", command),
                Err(e) => {
                    tracing::warn!("Write failed: {}", e);
                    drop_link(&mut state).await;
                }
            }
        }
    }

    /// Open the link, retrying until it succeeds.
    async fn connect(&self) -> Box<dyn SerialLink> {
        loop {
            match self.connector.open(&self.port, self.baud).await {
                Ok(link) => {
                    tracing::info!("Joystick connected to controller on {}", self.port);
                    return link;
                }
                Err(e) => {
                    tracing::warn!("{}, retrying in {:?}", e, self.reconnect_delay);
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }
}

async fn drop_link(state: &mut JoystickState) {
    if let Some(mut link) = state.link.take() {
        link.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulatedController;

    fn config() -> Config {
        let mut config = Config::default();
        config.serial.port = "sim".to_string();
        config.joystick.enabled = true;
        config.joystick.send_interval_ms = 20;
        config.joystick.reconnect_delay_ms = 30;
        config
    }

    #[tokio::test]
    async fn test_resends_direction_until_stopped() {
        let sim = SimulatedController::new();
        let joystick = Joystick::new(&config(), Arc::new(sim.clone()));
        let task = joystick.spawn();

        joystick.apply(JoystickAction::Start, Some("forward".to_string())).await;
        assert!(sim.wait_for_frames(3, Duration::from_secs(2)).await);
        joystick.apply(JoystickAction::Stop, None).await;

        let frames = sim.frame_texts();
        let stop_at = frames.iter().position(|f| f == "s\r\n").expect("stop line sent");
        assert!(frames[..stop_at].iter().all(|f| f == "forward\r\n"));
        assert!(stop_at >= 3);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(sim.frame_texts().len(), frames.len());
        assert!(!joystick.status().await.sending);
        task.abort();
    }

    #[tokio::test]
    async fn test_reconnects_after_failures() {
        let sim = SimulatedController::new();
        sim.refuse_connections(true);
        let joystick = Joystick::new(&config(), Arc::new(sim.clone()));
        let task = joystick.spawn();

        joystick.apply(JoystickAction::Start, Some("left".to_string())).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!joystick.status().await.connected);

        sim.refuse_connections(false);
        assert!(sim.wait_for_frames(1, Duration::from_secs(2)).await);
        assert!(joystick.status().await.connected);

        // A failed write drops the link; the sender opens a fresh one.
        sim.fail_writes(true);
        tokio::time::sleep(Duration::from_millis(60)).await;
        sim.fail_writes(false);
        let before = sim.frame_texts().len();
        assert!(sim.wait_for_frames(before + 1, Duration::from_secs(2)).await);
        assert!(sim.connections_opened() >= 2);
        task.abort();
    }
}
