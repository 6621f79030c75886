//! A simple file sink which receives JSON-serialized [`StampedRecord`]s,
//! one per line. Used for replay functionality.
use crate::recording::{find_recordings, RecordingMetadata, StampedRecord, RECORDING_FILE_EXT};
use crate::sinks::{Sink, SinkError};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bms_monitor_api::TelemetryRecord;
use chrono::prelude::*;

pub struct FileSink {
    file: fs::File,
    path: PathBuf,
}

impl FileSink {
    /// Creates a new recording file in `dir`, named after the current
    /// local time, and writes the metadata header to it.
    pub fn generate_recording_file(
        dir: &Path,
        metadata: &RecordingMetadata,
        remove_prev_recordings: bool,
    ) -> Result<Self, SinkError> {
        if remove_prev_recordings {
            if let Ok(recordings) = find_recordings(dir) {
                for recording in recordings {
                    fs::remove_file(recording).map_err(|e| {
                        SinkError::SetupIOError(
                            Some("Failed to remove previous recording".to_string()),
                            e,
                        )
                    })?;
                }
            }
        }

        // "bms-2026-10-17T17:13:16.ndjson"
        let path = dir.join(format!(
            "bms-{}{}",
            metadata.started.format("%Y-%m-%dT%H:%M:%S"),
            RECORDING_FILE_EXT
        ));

        fs::create_dir_all(dir).map_err(|e| {
            SinkError::SetupIOError(
                Some(format!(
                    "Failed to create recording directory {}",
                    dir.display()
                )),
                e,
            )
        })?;
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                SinkError::SetupIOError(
                    Some(format!("Failed to create recording {}", path.display())),
                    e,
                )
            })?;

        let mut sink = Self { file, path };
        sink.write_line(&serde_json::to_string(metadata)?)?;
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, json: &str) -> Result<(), SinkError> {
        self.file
            .write_all(format!("{}\n", json).as_bytes())
            .map_err(SinkError::DrainIOError)
    }
}

impl Sink for FileSink {
    fn drain(&mut self, record: &TelemetryRecord) -> Result<(), SinkError> {
        let json = serde_json::to_string(&StampedRecord {
            received: Local::now(),
            record: record.clone(),
        })?;
        self.write_line(&json)
    }

    fn describe(&self) -> String {
        format!("recording {}", self.path.display())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sources::{Fetched, FileSource, Source};

    fn metadata(comment: &str) -> RecordingMetadata {
        RecordingMetadata {
            source: "mock transport".to_string(),
            started: Local::now(),
            comment: Some(comment.to_string()),
        }
    }

    #[test]
    fn record_then_replay() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink =
            FileSink::generate_recording_file(&dir.path().join("recordings"), &metadata("first"), false)
                .unwrap();
        for soc in [10.0, 20.0] {
            sink.drain(&TelemetryRecord {
                state_of_charge: Some(soc),
                ..TelemetryRecord::default()
            })
            .unwrap();
        }
        let path = sink.path().to_path_buf();
        drop(sink);

        let mut src = FileSource::new(fs::File::open(&path).unwrap(), &path)
            .unwrap()
            .paced(false);
        assert_eq!(src.metadata().comment.as_deref(), Some("first"));
        let mut socs = vec![];
        while let Fetched::Record(r) = src.fetch().unwrap() {
            socs.push(r.state_of_charge.unwrap());
        }
        assert_eq!(socs, [10.0, 20.0]);
    }

    #[test]
    fn clear_previous_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(format!("bms-2000-01-01T00:00:00{}", RECORDING_FILE_EXT));
        fs::write(&stale, "{}\n").unwrap();

        let sink = FileSink::generate_recording_file(dir.path(), &metadata("second"), true).unwrap();
        assert!(!stale.exists());
        assert_eq!(find_recordings(dir.path()).unwrap(), [sink.path().to_path_buf()]);
    }

    #[test]
    fn refuse_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = metadata("same second");
        let _first = FileSink::generate_recording_file(dir.path(), &metadata, false).unwrap();
        assert!(matches!(
            FileSink::generate_recording_file(dir.path(), &metadata, false),
            Err(SinkError::SetupIOError(..))
        ));
    }
}
