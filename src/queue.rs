//! Bounded FIFO of telemetry records between the reader thread
//! (producer) and the presentation loop (consumer).
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bms_monitor_api::TelemetryRecord;
use crossbeam_channel::{self as channel, RecvTimeoutError, SendTimeoutError, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};

/// What the producer does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued record to make room.
    DropOldest,
    /// Wait until the consumer makes room.
    Block,
    /// Never full. Memory grows without bound if the consumer falls
    /// behind.
    Unbounded,
}

impl OverflowPolicy {
    pub const VARIANTS: [&'static str; 3] = ["drop-oldest", "block", "unbounded"];

    pub fn is_bounded(&self) -> bool {
        !matches!(self, Self::Unbounded)
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DropOldest => "drop-oldest",
            Self::Block => "block",
            Self::Unbounded => "unbounded",
        })
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop-oldest" => Ok(Self::DropOldest),
            "block" => Ok(Self::Block),
            "unbounded" => Ok(Self::Unbounded),
            _ => Err(format!(
                "unknown overflow policy {:?}, expected one of {:?}",
                s,
                Self::VARIANTS
            )),
        }
    }
}

/// Outcome of [`RecordSender::push`].
#[derive(Debug, PartialEq, Eq)]
pub enum Pushed {
    Queued,
    /// Queued after evicting this many older records.
    DroppedOldest(usize),
    /// Gave up waiting for room; the record was not queued.
    Abandoned,
    /// The consumer is gone.
    Closed,
}

pub struct RecordSender {
    tx: channel::Sender<TelemetryRecord>,
    /// Handle used to evict the oldest record under
    /// [`OverflowPolicy::DropOldest`].
    evict: Option<channel::Receiver<TelemetryRecord>>,
    /// Disconnected once the [`RecordReceiver`] is dropped. The eviction
    /// handle keeps the record channel itself connected.
    consumer: channel::Receiver<()>,
    policy: OverflowPolicy,
}

pub struct RecordReceiver {
    rx: channel::Receiver<TelemetryRecord>,
    _alive: channel::Sender<()>,
}

/// Outcome of [`RecordReceiver::pop`].
#[derive(Debug)]
pub enum Popped {
    Record(TelemetryRecord),
    Empty,
    /// Empty, and the producer is gone: no record will ever arrive.
    Closed,
}

/// Creates a record queue. `capacity` is ignored for
/// [`OverflowPolicy::Unbounded`] and clamped to at least one otherwise.
pub fn channel(capacity: usize, policy: OverflowPolicy) -> (RecordSender, RecordReceiver) {
    let (tx, rx) = match policy {
        OverflowPolicy::Unbounded => channel::unbounded(),
        _ => channel::bounded(capacity.max(1)),
    };
    let evict = match policy {
        OverflowPolicy::DropOldest => Some(rx.clone()),
        _ => None,
    };

    let (alive, consumer) = channel::bounded(0);

    (
        RecordSender {
            tx,
            evict,
            consumer,
            policy,
        },
        RecordReceiver { rx, _alive: alive },
    )
}

impl RecordSender {
    fn consumer_gone(&self) -> bool {
        matches!(self.consumer.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Queues `record` according to the overflow policy. Under
    /// [`OverflowPolicy::Block`] the producer waits in slices of
    /// `patience`, asking `keep_waiting` after each one whether to go on.
    pub fn push(
        &self,
        mut record: TelemetryRecord,
        patience: Duration,
        mut keep_waiting: impl FnMut() -> bool,
    ) -> Pushed {
        if self.consumer_gone() {
            return Pushed::Closed;
        }

        match self.policy {
            OverflowPolicy::Block => loop {
                match self.tx.send_timeout(record, patience) {
                    Ok(()) => return Pushed::Queued,
                    Err(SendTimeoutError::Timeout(r)) if keep_waiting() => record = r,
                    Err(SendTimeoutError::Timeout(_)) => return Pushed::Abandoned,
                    Err(SendTimeoutError::Disconnected(_)) => return Pushed::Closed,
                }
            },
            OverflowPolicy::DropOldest | OverflowPolicy::Unbounded => {
                let mut dropped = 0;
                loop {
                    match self.tx.try_send(record) {
                        Ok(()) if dropped == 0 => return Pushed::Queued,
                        Ok(()) => return Pushed::DroppedOldest(dropped),
                        Err(TrySendError::Full(r)) => {
                            // the consumer may have made room in the meantime
                            if let Some(Ok(_)) = self.evict.as_ref().map(|rx| rx.try_recv()) {
                                dropped += 1;
                            }
                            record = r;
                        }
                        Err(TrySendError::Disconnected(_)) => return Pushed::Closed,
                    }
                }
            }
        }
    }
}

impl RecordReceiver {
    /// Removes the oldest record, if any, without blocking.
    pub fn pop(&self) -> Popped {
        match self.rx.try_recv() {
            Ok(record) => Popped::Record(record),
            Err(TryRecvError::Empty) => Popped::Empty,
            Err(TryRecvError::Disconnected) => Popped::Closed,
        }
    }

    /// Like [`Self::pop`], but waits up to `timeout` for a record.
    pub fn pop_timeout(&self, timeout: Duration) -> Popped {
        match self.rx.recv_timeout(timeout) {
            Ok(record) => Popped::Record(record),
            Err(RecvTimeoutError::Timeout) => Popped::Empty,
            Err(RecvTimeoutError::Disconnected) => Popped::Closed,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
