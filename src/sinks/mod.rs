//! A sink to which displayed [`TelemetryRecord`]s are drained: the
//! terminal display, and optionally a recording file for later replay.
use crate::diag;

use bms_monitor_api::TelemetryRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to setup sink during I/O:{} {1}", { if let Some(s) = .0 {
        format!(" {}:", s)
    } else {
        "".to_string()
    }})]
    SetupIOError(Option<String>, #[source] std::io::Error),
    #[error("Failed to serialize telemetry: {0}")]
    DrainSerError(#[from] serde_json::Error),
    #[error("Failed to drain telemetry on I/O: {0}")]
    DrainIOError(#[source] std::io::Error),
}

impl diag::DiagnosableError for SinkError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::SetupIOError(..) => vec!["Choose another directory with --record-dir".to_string()],
            _ => vec![],
        }
    }
}

pub mod file;
pub use file::FileSink;

mod display;
pub use display::TerminalSink;

pub trait Sink {
    fn drain(&mut self, record: &TelemetryRecord) -> Result<(), SinkError>;
    fn describe(&self) -> String;
}
