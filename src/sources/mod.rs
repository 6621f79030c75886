//! A source from which telemetry records are read. Records are pushed
//! onto the record queue by the reader thread and drained to configured
//! sinks (the display and recording files) by the presentation loop.
use crate::diag;

use bms_monitor_api::TelemetryRecord;
use thiserror::Error;

/// Lines longer than this without a terminator are discarded.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Outcome of a single poll of a [`Source`].
#[derive(Debug)]
pub enum Fetched {
    Record(TelemetryRecord),
    /// Nothing to read right now; poll again later.
    Pending,
    /// The source will never yield another record.
    Exhausted,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to setup source: {0}")]
    SetupError(String),
    #[error("Failed to setup source during I/O: {0}")]
    SetupIOError(#[source] std::io::Error),
    #[error("Failed to decode line as UTF-8: {0}")]
    DecodeError(#[from] std::string::FromUtf8Error),
    #[error("Failed to parse telemetry record: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Transport failure: {0}")]
    TransportError(#[source] std::io::Error),
    #[error("Discarded a line exceeding {0} bytes")]
    OverlongLine(usize),
}

impl SourceError {
    /// Whether the link itself failed, as opposed to a single bad line.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::TransportError(_))
    }
}

impl diag::DiagnosableError for SourceError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::SetupError(_) => vec!["Recordings are written by `bms-monitor monitor --record`".to_string()],
            _ => vec![],
        }
    }
}

pub trait Source: std::marker::Send {
    /// Polls the source for the next record. Errors concern a single
    /// line or a single poll: the source remains usable afterwards.
    fn fetch(&mut self) -> Result<Fetched, SourceError>;

    fn describe(&self) -> String;
}

/// Decodes one line (terminator included or not) into a record. Blank
/// lines yield `None`.
pub fn decode_line(line: Vec<u8>) -> Result<Option<TelemetryRecord>, SourceError> {
    if line.len() > MAX_LINE_LEN {
        return Err(SourceError::OverlongLine(MAX_LINE_LEN));
    }
    let text = String::from_utf8(line)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    Ok(Some(TelemetryRecord::from_line(text)?))
}

mod file;
pub use file::FileSource;

mod transport;
pub use transport::TransportSource;
