//! Source which reads newline-delimited JSON records from a serial
//! device or socket.
use crate::sources::{decode_line, Fetched, Source, SourceError, MAX_LINE_LEN};
use crate::transport::Transport;

use std::io;

const READ_CHUNK: usize = 4096;

pub struct TransportSource {
    transport: Box<dyn Transport>,
    /// Bytes received but not yet terminated by a newline.
    pending: Vec<u8>,
    /// Whether we are skipping the tail of an overlong line.
    discarding: bool,
}

impl TransportSource {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            pending: Vec::with_capacity(READ_CHUNK),
            discarding: false,
        }
    }

    /// Removes and returns the next complete line from the buffer, if
    /// any.
    fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let end = self.pending.iter().position(|&b| b == b'\n')?;
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            if std::mem::take(&mut self.discarding) {
                continue;
            }

            return Some(line);
        }
    }
}

impl Source for TransportSource {
    fn fetch(&mut self) -> Result<Fetched, SourceError> {
        let mut discarded = false;
        loop {
            if let Some(line) = self.next_line() {
                // NOTE: the line is consumed even if it fails to decode
                match decode_line(line)? {
                    Some(record) => return Ok(Fetched::Record(record)),
                    None => continue,
                }
            }

            // At most one block of an overlong line is skipped per fetch.
            if self.discarding {
                discarded |= !self.pending.is_empty();
                self.pending.clear();
                if discarded {
                    return Ok(Fetched::Pending);
                }
            }

            if self.pending.len() > MAX_LINE_LEN {
                self.pending.clear();
                self.discarding = true;
                return Err(SourceError::OverlongLine(MAX_LINE_LEN));
            }

            let avail = self
                .transport
                .bytes_available()
                .map_err(SourceError::TransportError)?;
            if avail == 0 {
                return Ok(Fetched::Pending);
            }

            let mut chunk = [0; READ_CHUNK];
            let n = match self.transport.read(&mut chunk[..avail.min(READ_CHUNK)]) {
                Ok(0) => return Ok(Fetched::Pending),
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(Fetched::Pending)
                }
                Err(e) => return Err(SourceError::TransportError(e)),
            };
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }

    fn describe(&self) -> String {
        self.transport.describe()
    }
}
