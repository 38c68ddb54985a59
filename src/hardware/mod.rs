// src/hardware/mod.rs - Serial link abstraction for the motion controller
pub mod serial;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use serial::{PortLink, SystemSerial};

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("cannot open serial port {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: std::io::Error,
    },
    #[error("serial write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("serial read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("serial link is closed")]
    Closed,
}

/// One open connection to the controller.
///
/// A link has a single owner at a time; nothing in the host shares a
/// handle between writers. Dropping a link releases the device.
#[async_trait]
pub trait SerialLink: Send {
    /// Write the whole buffer.
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError>;

    /// Return whatever input is buffered, waiting at most `wait` for the
    /// first byte. An empty vector means nothing arrived in time.
    async fn read_available(&mut self, wait: Duration) -> Result<Vec<u8>, SerialError>;

    /// Discard stale input and pending output.
    fn clear_buffers(&mut self) -> Result<(), SerialError>;

    /// Release the device. Safe to call more than once.
    async fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Opens links; swapped for the simulator in tests and `--simulate` mode.
#[async_trait]
pub trait SerialConnector: Send + Sync {
    async fn open(&self, port: &str, baud: u32) -> Result<Box<dyn SerialLink>, SerialError>;

    fn available_ports(&self) -> Vec<String> {
        Vec::new()
    }
}
