//! Serial port transport
//!
//! Writes go straight to the port. A reader thread splits inbound bytes into
//! lines and forwards them to the controller task.

use super::{Transport, TransportEvent};
use cncstream_core::{ConnectionError, Error, Result};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of the inbound line channel
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,
    pub description: String,
    pub manufacturer: Option<String>,
    /// USB vendor and product ids
    pub usb_ids: Option<(u16, u16)>,
}

/// List serial ports that look like CNC controllers
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::other(format!("Failed to enumerate ports: {}", e))
    })?;

    Ok(ports
        .into_iter()
        .filter(|port| is_controller_port(&port.port_name))
        .map(|port| match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => SerialPortInfo {
                description: format!(
                    "USB {} {}",
                    usb.manufacturer.as_deref().unwrap_or("Device"),
                    usb.product.as_deref().unwrap_or("Serial Port")
                ),
                manufacturer: usb.manufacturer,
                usb_ids: Some((usb.vid, usb.pid)),
                port_name: port.port_name,
            },
            _ => SerialPortInfo {
                port_name: port.port_name,
                description: "Serial Port".to_string(),
                manufacturer: None,
                usb_ids: None,
            },
        })
        .collect())
}

/// COM*, /dev/ttyUSB*, /dev/ttyACM*, /dev/cu.usbserial-*, /dev/cu.usbmodem*
fn is_controller_port(name: &str) -> bool {
    if let Some(number) = name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }
    ["/dev/ttyUSB", "/dev/ttyACM", "/dev/cu.usbserial-", "/dev/cu.usbmodem"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

pub struct SerialTransport {
    port_name: String,
    port: Box<dyn serialport::SerialPort>,
    open: Arc<AtomicBool>,
}

impl SerialTransport {
    /// Open `port_name` and start its reader thread
    pub fn open(
        port_name: &str,
        baud_rate: u32,
    ) -> std::result::Result<(Self, mpsc::Receiver<TransportEvent>), ConnectionError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", port_name, e);
                match e.kind() {
                    serialport::ErrorKind::NoDevice => ConnectionError::PortNotFound {
                        port: port_name.to_string(),
                    },
                    _ => ConnectionError::FailedToOpen {
                        port: port_name.to_string(),
                        reason: e.to_string(),
                    },
                }
            })?;
        let reader = port.try_clone().map_err(|e| ConnectionError::SerialError {
            reason: e.to_string(),
        })?;

        let open = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let flag = open.clone();
        let name = port_name.to_string();
        std::thread::Builder::new()
            .name(format!("serial-reader {}", port_name))
            .spawn(move || read_lines(reader, flag, tx, name))
            .map_err(|e| ConnectionError::IoError {
                reason: e.to_string(),
            })?;

        tracing::info!("Opened {} at {} baud", port_name, baud_rate);
        Ok((
            Self {
                port_name: port_name.to_string(),
                port,
                open,
            },
            rx,
        ))
    }
}

fn read_lines(
    mut reader: Box<dyn serialport::SerialPort>,
    open: Arc<AtomicBool>,
    tx: mpsc::Sender<TransportEvent>,
    port_name: String,
) {
    let mut buf = [0u8; 512];
    let mut pending: Vec<u8> = Vec::new();

    while open.load(Ordering::Acquire) {
        match reader.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = pending.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw).trim_end().to_string();
                    if tx.blocking_send(TransportEvent::Line(line)).is_err() {
                        return;
                    }
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
            Err(e) => {
                tracing::error!("Read from {} failed: {}", port_name, e);
                open.store(false, Ordering::Release);
                let _ = tx.blocking_send(TransportEvent::Closed(Some(e.to_string())));
                return;
            }
        }
    }
    tracing::debug!("Reader for {} stopped", port_name);
}

impl Transport for SerialTransport {
    fn port(&self) -> &str {
        &self.port_name
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn write(&mut self, data: &[u8]) -> std::result::Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::ConnectionLost {
                reason: format!("{} is closed", self.port_name),
            });
        }
        self.port
            .write_all(data)
            .and_then(|_| self.port.flush())
            .map_err(|e| ConnectionError::SerialError {
                reason: e.to_string(),
            })
    }

    fn close(&mut self) {
        if self.open.swap(false, Ordering::AcqRel) {
            tracing::info!("Closed {}", self.port_name);
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}
