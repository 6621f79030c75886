//! On-disk format of recorded telemetry: a [`RecordingMetadata`] header
//! line followed by one [`StampedRecord`] per line.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bms_monitor_api::TelemetryRecord;
use chrono::prelude::*;
use serde::{Deserialize, Serialize};

pub const RECORDING_FILE_EXT: &str = ".ndjson";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordingMetadata {
    /// Description of the transport the telemetry was received from.
    pub source: String,
    pub started: DateTime<Local>,
    /// Arbitrary comment that describes the recording.
    pub comment: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StampedRecord {
    /// When the monitor displayed the record.
    pub received: DateTime<Local>,
    pub record: TelemetryRecord,
}

/// ls `*.ndjson` in given path, oldest first.
pub fn find_recordings(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut recordings: Vec<PathBuf> = fs::read_dir(dir)?
        // we only care about files we can access
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map_or(false, |name| name.ends_with(RECORDING_FILE_EXT))
        })
        .map(|entry| entry.path())
        .collect();

    // file names embed the start time
    recordings.sort();
    Ok(recordings)
}
