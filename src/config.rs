//! # Host Configuration
//!
//! Configuration for the serial link, the script engine, the script
//! directory, the joystick pusher and the HTTP server.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:5000"
//!
//! [serial]
//! port = "/dev/ttyACM0"
//! baud = 115200
//!
//! [motion]
//! ack_timeout_ms = 30000
//! max_loops = 3
//!
//! [joystick]
//! enabled = true
//! send_interval_ms = 100
//! ```
//!
//! Every section is optional; missing keys fall back to the defaults below.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the motion host.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub joystick: JoystickConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// Controller serial link.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud: default_baud(),
        }
    }
}

/// Script execution engine timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionConfig {
    /// Budget for the completion marker after each turn/move command.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// Upper bound on a single read while waiting for the marker.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long `stop` waits for the run to unwind before aborting the task.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// Stop after this many full passes over the script. Unset loops until stopped.
    #[serde(default)]
    pub max_loops: Option<u32>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_ack_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            max_loops: None,
        }
    }
}

impl MotionConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Upload directory holding the motion scripts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScriptsConfig {
    #[serde(default = "default_scripts_directory")]
    pub directory: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            directory: default_scripts_directory(),
        }
    }
}

/// Continuous-send joystick subsystem.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JoystickConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Device for the joystick link; falls back to `serial.port`.
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: None,
            send_interval_ms: default_send_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl JoystickConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Device path used by the joystick pusher.
    pub fn joystick_port(&self) -> &str {
        self.joystick.port.as_deref().unwrap_or(&self.serial.port)
    }

    /// Reject values that would turn the timing loops into spins or hangs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.baud == 0 {
            return Err(ConfigError::Invalid("serial.baud must be non-zero".to_string()));
        }
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::Invalid("serial.port must not be empty".to_string()));
        }
        if self.motion.ack_timeout_ms == 0 {
            return Err(ConfigError::Invalid("motion.ack_timeout_ms must be non-zero".to_string()));
        }
        if self.motion.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("motion.poll_interval_ms must be non-zero".to_string()));
        }
        if self.motion.max_loops == Some(0) {
            return Err(ConfigError::Invalid("motion.max_loops must be at least 1 when set".to_string()));
        }
        if self.joystick.send_interval_ms == 0 {
            return Err(ConfigError::Invalid("joystick.send_interval_ms must be non-zero".to_string()));
        }
        if self.joystick.reconnect_delay_ms == 0 {
            return Err(ConfigError::Invalid("joystick.reconnect_delay_ms must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn default_bind() -> String { "0.0.0.0:5000".to_string() }
fn default_port() -> String { "/dev/serial/by-path/platform-70090000.xusb-usb-0:3.2:1.0".to_string() }
fn default_baud() -> u32 { 115_200 }
fn default_ack_timeout_ms() -> u64 { 30_000 }
fn default_poll_interval_ms() -> u64 { 10 }
fn default_stop_grace_ms() -> u64 { 500 }
fn default_scripts_directory() -> String { "uploads".to_string() }
fn default_send_interval_ms() -> u64 { 100 }
fn default_reconnect_delay_ms() -> u64 { 2_000 }
fn default_log_level() -> String { "info".to_string() }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let config: Config = match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                return Err(ConfigError::Toml(e));
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    config.validate()?;
    Ok(config)
}
