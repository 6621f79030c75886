//! Transport over TCP, for telemetry sources exposed as a serial port
//! over the network (or simulated).
use crate::transport::{Transport, TransportError};

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// How long a single availability check may block.
const PEEK_TIMEOUT: Duration = Duration::from_millis(1);
const PEEK_SIZE: usize = 4096;

pub struct SocketTransport {
    stream: TcpStream,
    peer: String,
}

impl SocketTransport {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let peer = format!("{}:{}", host, port);
        let error = |e| TransportError::SocketConnect(peer.clone(), e);

        let mut last_error = None;
        for addr in (host, port).to_socket_addrs().map_err(error)? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Self::from_stream(stream, peer.clone()).map_err(error),
                Err(e) => last_error = Some(e),
            }
        }

        Err(error(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        })))
    }

    fn from_stream(stream: TcpStream, peer: String) -> io::Result<Self> {
        // Reads only ever happen once data is known to be pending, so a
        // read timeout only bounds the availability check.
        stream.set_read_timeout(Some(PEEK_TIMEOUT))?;
        stream.set_write_timeout(Some(Duration::from_secs(1)))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream, peer })
    }
}

impl Read for SocketTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for SocketTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Transport for SocketTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let mut buf = [0; PEEK_SIZE];
        match self.stream.peek(&mut buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            )),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn try_clone_transport(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(Self {
            stream: self.stream.try_clone()?,
            peer: self.peer.clone(),
        }))
    }

    fn describe(&self) -> String {
        format!("socket {}", self.peer)
    }
}
