//! Byte transport underneath a controller
//!
//! The controller only needs to write bytes and to know whether the link is
//! still open. Inbound data arrives separately as [`TransportEvent`]s on a
//! channel fed by the transport's reader.

pub mod mock;
pub mod serial;

pub use mock::MockTransport;
pub use serial::{list_ports, SerialPortInfo, SerialTransport};

use cncstream_core::ConnectionError;

/// Inbound side of a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One line, without its terminator
    Line(String),
    /// The link went away, with the failure if there was one
    Closed(Option<String>),
}

/// Outbound side of a transport
pub trait Transport: Send {
    /// Port name used in events and logs
    fn port(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Write all of `data`
    fn write(&mut self, data: &[u8]) -> Result<(), ConnectionError>;

    fn close(&mut self);
}
