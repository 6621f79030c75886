//! Transport over a physical (or virtual) serial device.
use crate::transport::{Transport, TransportError};

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::SerialPort;

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    device: String,
}

impl SerialTransport {
    /// Opens `device` at `baud` with 8N1 framing and no flow control.
    pub fn open(device: &str, baud: u32, timeout: Duration) -> Result<Self, TransportError> {
        let port = serialport::new(device, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| TransportError::SerialOpen(device.to_string(), e))?;

        Ok(Self {
            port,
            device: device.to_string(),
        })
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }

    fn try_clone_transport(&self) -> io::Result<Box<dyn Transport>> {
        let port = self.port.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(Self {
            port,
            device: self.device.clone(),
        }))
    }

    fn describe(&self) -> String {
        format!(
            "serial device {} ({} baud)",
            self.device,
            self.port.baud_rate().unwrap_or_default()
        )
    }
}
