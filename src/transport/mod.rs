//! The byte-stream channel that carries telemetry from, and commands
//! to, the BMS: either a serial device or a TCP socket addressed with a
//! serial-compatible `socket://host:port` URL.
use crate::diag;

use std::fmt;
use std::io::{Read, Write};
use std::time::Duration;

use thiserror::Error;

pub mod serial;
pub use serial::SerialTransport;

pub mod socket;
pub use socket::SocketTransport;

#[cfg(test)]
pub mod mock;

const SOCKET_SCHEME: &str = "socket://";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid device address {0:?}: {1}")]
    InvalidAddress(String, String),
    #[error("Failed to open serial device {0}: {1}")]
    SerialOpen(String, #[source] serialport::Error),
    #[error("Failed to connect to {0}: {1}")]
    SocketConnect(String, #[source] std::io::Error),
    #[error("Failed to split transport into read and write halves: {0}")]
    Split(#[source] std::io::Error),
}

impl diag::DiagnosableError for TransportError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::InvalidAddress(..) => vec![
                "Use a serial device path (e.g. /dev/ttyACM0) or socket://<host>:<port>".to_string(),
            ],
            Self::SerialOpen(device, _) => vec![
                format!("Check that {} exists and that you may open it (e.g. membership of the dialout group)", device),
            ],
            Self::SocketConnect(..) => vec![
                "Is the telemetry source running? A simulated one is started with `bms-simulator --bind <host>:<port>`".to_string(),
            ],
            _ => vec![],
        }
    }
}

/// Where the transport is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Path to a serial device.
    Serial(String),
    /// TCP endpoint, given as `socket://host:port`.
    Socket { host: String, port: u16 },
}

impl Address {
    pub fn parse(address: &str) -> Result<Self, TransportError> {
        let address = address.trim();
        let invalid = |reason: &str| TransportError::InvalidAddress(address.to_string(), reason.to_string());

        if address.is_empty() {
            return Err(invalid("empty address"));
        }

        let rest = match address.strip_prefix(SOCKET_SCHEME) {
            Some(rest) => rest,
            None => return Ok(Self::Serial(address.to_string())),
        };

        // socket://host:port[/][?options]; options are not supported and
        // thus ignored.
        let rest = rest.split('?').next().unwrap_or_default().trim_end_matches('/');
        let (host, port) = rest.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = match port.parse::<u16>() {
            Ok(0) | Err(_) => return Err(invalid("port must be in 1..=65535")),
            Ok(port) => port,
        };

        Ok(Self::Socket {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial(device) => write!(f, "{}", device),
            Self::Socket { host, port } if host.contains(':') => {
                write!(f, "{}[{}]:{}", SOCKET_SCHEME, host, port)
            }
            Self::Socket { host, port } => write!(f, "{}{}:{}", SOCKET_SCHEME, host, port),
        }
    }
}

/// A bidirectional byte stream to the BMS.
pub trait Transport: Read + Write + std::marker::Send {
    /// How many bytes can be read without blocking. Zero means nothing
    /// is pending; an error means the link itself is broken.
    fn bytes_available(&mut self) -> std::io::Result<usize>;

    /// Another handle to the same underlying link, so that reading and
    /// writing can happen from different threads.
    fn try_clone_transport(&self) -> std::io::Result<Box<dyn Transport>>;

    fn describe(&self) -> String;
}

/// Opens the transport found at `address`. `timeout` bounds how long a
/// single blocking operation may take.
pub fn open(address: &Address, baud: u32, timeout: Duration) -> Result<Box<dyn Transport>, TransportError> {
    Ok(match address {
        Address::Serial(device) => Box::new(SerialTransport::open(device, baud, timeout)?),
        Address::Socket { host, port } => Box::new(SocketTransport::connect(host, *port, timeout)?),
    })
}

/// Splits an opened transport into a read half and a write half.
pub fn split(transport: Box<dyn Transport>) -> Result<(Box<dyn Transport>, Box<dyn Transport>), TransportError> {
    let writer = transport.try_clone_transport().map_err(TransportError::Split)?;
    Ok((transport, writer))
}
