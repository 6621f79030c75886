//! The transport reader: a background thread that polls a [`Source`]
//! and pushes every decoded record onto the record queue.
use crate::diag;
use crate::log;
use crate::queue::{Pushed, RecordSender};
use crate::sources::{Fetched, Source};

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{self as channel, RecvTimeoutError, TryRecvError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Failed to spawn reader thread: {0}")]
    SpawnError(#[source] std::io::Error),
    #[error("Reader thread panicked")]
    Panicked,
}

impl diag::DiagnosableError for ReaderError {}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReaderStats {
    /// How many records we have decoded from the source.
    pub received: usize,
    /// How many lines we discarded because they could not be decoded.
    pub malformed: usize,
    /// How many decoded records were evicted from, or never made it
    /// into, the record queue.
    pub dropped: usize,
    /// How many polls failed because of the transport itself.
    pub transport_errors: usize,
}

/// Owner of the reader thread. Dropping the handle cancels and joins the
/// thread, which closes the read half of the transport.
pub struct ReaderHandle {
    cancel: Option<channel::Sender<()>>,
    thread: Option<JoinHandle<ReaderStats>>,
}

impl ReaderHandle {
    pub fn spawn(
        source: Box<dyn Source>,
        queue: RecordSender,
        poll_interval: Duration,
    ) -> Result<Self, ReaderError> {
        // Nothing is ever sent: the reader stops once this channel is
        // disconnected.
        let (cancel, cancelled) = channel::bounded(0);
        let thread = std::thread::Builder::new()
            .name("bms-reader".to_string())
            .spawn(move || run(source, queue, cancelled, poll_interval))
            .map_err(ReaderError::SpawnError)?;

        Ok(Self {
            cancel: Some(cancel),
            thread: Some(thread),
        })
    }

    /// Signals the reader to stop and waits for it.
    pub fn shutdown(mut self) -> Result<ReaderStats, ReaderError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<ReaderStats, ReaderError> {
        drop(self.cancel.take());
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| ReaderError::Panicked),
            None => Ok(ReaderStats::default()),
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn is_cancelled(cancelled: &channel::Receiver<()>) -> bool {
    !matches!(cancelled.try_recv(), Err(TryRecvError::Empty))
}

/// Sleeps for `interval` unless cancelled first. Returns whether to go
/// on.
fn idle(cancelled: &channel::Receiver<()>, interval: Duration) -> bool {
    matches!(cancelled.recv_timeout(interval), Err(RecvTimeoutError::Timeout))
}

fn run(
    mut source: Box<dyn Source>,
    queue: RecordSender,
    cancelled: channel::Receiver<()>,
    poll_interval: Duration,
) -> ReaderStats {
    let mut stats = ReaderStats::default();
    let mut link_down = false;
    let mut overflow_warning = false;

    while !is_cancelled(&cancelled) {
        match source.fetch() {
            Ok(Fetched::Record(record)) => {
                if std::mem::take(&mut link_down) {
                    log::status("Recovered", format!("{} is delivering again", source.describe()));
                }
                stats.received += 1;

                match queue.push(record, poll_interval, || !is_cancelled(&cancelled)) {
                    Pushed::Queued => (),
                    Pushed::DroppedOldest(n) => {
                        stats.dropped += n;
                        if !overflow_warning {
                            log::warn(format!(
                                "display is not keeping up with {}; dropping oldest records",
                                source.describe()
                            ));
                            overflow_warning = true;
                        }
                    }
                    Pushed::Abandoned => {
                        stats.dropped += 1;
                        break;
                    }
                    Pushed::Closed => break,
                }
            }
            Ok(Fetched::Pending) => {
                if !idle(&cancelled, poll_interval) {
                    break;
                }
            }
            Ok(Fetched::Exhausted) => break,
            Err(e) if e.is_transport() => {
                stats.transport_errors += 1;
                if !link_down {
                    log::warn(format!(
                        "reading from {} failed: {}; polling again every {} ms",
                        source.describe(),
                        e,
                        poll_interval.as_millis()
                    ));
                    link_down = true;
                }
                if !idle(&cancelled, poll_interval) {
                    break;
                }
            }
            Err(e) => {
                stats.malformed += 1;
                log::warn(format!("{}, discarding line from {}", e, source.describe()));
            }
        }
    }

    stats
}
