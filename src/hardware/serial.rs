// src/hardware/serial.rs - serial2-tokio backed controller link
use super::{SerialConnector, SerialError, SerialLink};
use async_trait::async_trait;
use serial2_tokio::SerialPort;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::time::timeout;

const READ_CHUNK: usize = 256;

/// Opens real serial devices.
#[derive(Debug, Clone, Default)]
pub struct SystemSerial;

#[async_trait]
impl SerialConnector for SystemSerial {
    async fn open(&self, port: &str, baud: u32) -> Result<Box<dyn SerialLink>, SerialError> {
        let serial = SerialPort::open(port, baud).map_err(|source| SerialError::Connection {
            port: port.to_string(),
            source,
        })?;
        tracing::info!("Connected to controller on {} at {} baud", port, baud);
        Ok(Box::new(PortLink {
            port: Some(serial),
            name: port.to_string(),
        }))
    }

    fn available_ports(&self) -> Vec<String> {
        match SerialPort::available_ports() {
            Ok(paths) => paths.iter().map(|p| p.display().to_string()).collect(),
            Err(e) => {
                tracing::warn!("Failed to enumerate serial ports: {}", e);
                vec![]
            }
        }
    }
}

/// An open device. The file descriptor is released on `close` or drop.
pub struct PortLink {
    port: Option<SerialPort>,
    name: String,
}

impl PortLink {
    fn port(&self) -> Result<&SerialPort, SerialError> {
        self.port.as_ref().ok_or(SerialError::Closed)
    }
}

#[async_trait]
impl SerialLink for PortLink {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        let port = self.port()?;
        port.write_all(bytes).await.map_err(SerialError::Write)?;
        tracing::trace!("Wrote {} bytes to {}", bytes.len(), self.name);
        Ok(())
    }

    async fn read_available(&mut self, wait: Duration) -> Result<Vec<u8>, SerialError> {
        let port = self.port()?;
        let mut buf = [0u8; READ_CHUNK];
        match timeout(wait, port.read(&mut buf)).await {
            Ok(Ok(n)) => Ok(buf[..n].to_vec()),
            Ok(Err(e)) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(Vec::new()),
            Ok(Err(e)) => Err(SerialError::Read(e)),
            // Nothing arrived within the poll window.
            Err(_) => Ok(Vec::new()),
        }
    }

    fn clear_buffers(&mut self) -> Result<(), SerialError> {
        self.port()?.discard_buffers().map_err(SerialError::Write)
    }

    async fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::info!("Serial connection to {} closed", self.name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl std::fmt::Debug for PortLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortLink")
            .field("name", &self.name)
            .field("open", &self.port.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_missing_device_is_connection_error() {
        let result = SystemSerial.open("/dev/this-device-does-not-exist", 115_200).await;
        match result {
            Err(SerialError::Connection { port, .. }) => {
                assert_eq!(port, "/dev/this-device-does-not-exist");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened a device that does not exist"),
        }
    }
}
