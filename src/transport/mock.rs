//! In-memory transport for tests.
use crate::transport::Transport;

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

/// Both ends of a fake link. Clones share the same buffers, like
/// handles to the same device.
#[derive(Clone, Default)]
pub struct MockTransport {
    /// Bytes the device sent that have not been read yet.
    pub incoming: Arc<Mutex<VecDeque<u8>>>,
    /// Bytes written to the device.
    pub written: Arc<Mutex<Vec<u8>>>,
    /// Make every operation fail, as if the device was unplugged.
    pub broken: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn feed(&self, bytes: &[u8]) {
        self.incoming.lock().unwrap().extend(bytes);
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn set_broken(&self, broken: bool) {
        *self.broken.lock().unwrap() = broken;
    }

    fn check(&self) -> io::Result<()> {
        if *self.broken.lock().unwrap() {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
        } else {
            Ok(())
        }
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check()?;
        let mut incoming = self.incoming.lock().unwrap();
        let n = buf.len().min(incoming.len());
        for (dst, src) in buf.iter_mut().zip(incoming.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()
    }
}

impl Transport for MockTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.check()?;
        Ok(self.incoming.lock().unwrap().len())
    }

    fn try_clone_transport(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(self.clone()))
    }

    fn describe(&self) -> String {
        "mock transport".to_string()
    }
}
