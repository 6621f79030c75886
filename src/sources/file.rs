use crate::recording::{RecordingMetadata, StampedRecord};
use crate::sources::{Fetched, Source, SourceError};

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::prelude::*;

/// Replays a recording written by [`crate::sinks::FileSink`]. Records
/// are released at the same relative times they were received at,
/// unless pacing is disabled.
pub struct FileSource {
    reader: BufReader<fs::File>,
    path: PathBuf,
    metadata: RecordingMetadata,
    next: Option<StampedRecord>,
    /// When the first record was released, and when it was received.
    origin: Option<(Instant, DateTime<Local>)>,
    paced: bool,
}

impl FileSource {
    /// `path` is where `fd` was opened from, for display only.
    pub fn new(fd: fs::File, path: &Path) -> Result<Self, SourceError> {
        let mut reader = BufReader::new(fd);
        let mut header = String::new();
        reader
            .read_line(&mut header)
            .map_err(SourceError::SetupIOError)?;
        let metadata = serde_json::from_str(&header).map_err(|_| {
            SourceError::SetupError("Failed to deserialize recording header".to_string())
        })?;

        Ok(Self {
            reader,
            path: path.to_owned(),
            metadata,
            next: None,
            origin: None,
            paced: true,
        })
    }

    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn metadata(&self) -> RecordingMetadata {
        self.metadata.clone()
    }

    /// Reads the next stamped record. `Ok(None)` on end of file.
    fn read_next(&mut self) -> Result<Option<StampedRecord>, SourceError> {
        loop {
            let mut buf = vec![];
            if self
                .reader
                .read_until(b'\n', &mut buf)
                .map_err(SourceError::TransportError)?
                == 0
            {
                return Ok(None);
            }
            // a line that is not UTF-8 is consumed in full before it is rejected
            let line = String::from_utf8(buf)?;
            if !line.trim().is_empty() {
                return Ok(Some(serde_json::from_str(&line)?));
            }
        }
    }
}

impl Source for FileSource {
    fn fetch(&mut self) -> Result<Fetched, SourceError> {
        let stamped = match self.next.take() {
            Some(stamped) => stamped,
            None => match self.read_next()? {
                Some(stamped) => stamped,
                None => return Ok(Fetched::Exhausted),
            },
        };

        if self.paced {
            let (start, first) = *self
                .origin
                .get_or_insert((Instant::now(), stamped.received));
            // records stamped out of order are released immediately
            let offset = (stamped.received - first).to_std().unwrap_or_default();
            if start.elapsed() < offset {
                self.next = Some(stamped);
                return Ok(Fetched::Pending);
            }
        }

        Ok(Fetched::Record(stamped.record))
    }

    fn describe(&self) -> String {
        format!("recording {}", self.path.display())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bms_monitor_api::TelemetryRecord;
    use std::io::Write;

    fn stamped(soc: f64, received: DateTime<Local>) -> String {
        serde_json::to_string(&StampedRecord {
            received,
            record: TelemetryRecord {
                state_of_charge: Some(soc),
                ..TelemetryRecord::default()
            },
        })
        .unwrap()
    }

    fn recording(lines: &[String]) -> tempfile::NamedTempFile {
        recording_bytes(
            &lines
                .iter()
                .map(|l| l.as_bytes().to_vec())
                .collect::<Vec<_>>(),
        )
    }

    fn recording_bytes(lines: &[Vec<u8>]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let metadata = RecordingMetadata {
            source: "socket 127.0.0.1:7000".to_string(),
            started: Local::now(),
            comment: Some("bench test".to_string()),
        };
        writeln!(file, "{}", serde_json::to_string(&metadata).unwrap()).unwrap();
        for line in lines {
            file.write_all(line).unwrap();
            file.write_all(b"\n").unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn open(rec: &tempfile::NamedTempFile) -> FileSource {
        FileSource::new(rec.reopen().unwrap(), rec.path()).unwrap()
    }

    fn soc(fetched: Fetched) -> Option<f64> {
        match fetched {
            Fetched::Record(r) => r.state_of_charge,
            _ => None,
        }
    }

    #[test]
    fn replay_unpaced() {
        let t0 = Local::now();
        let lines = [
            stamped(1.0, t0),
            "not json".to_string(),
            stamped(2.0, t0 + chrono::Duration::hours(1)),
        ];
        let rec = recording(&lines);
        let mut src = open(&rec).paced(false);
        assert_eq!(src.metadata().comment.as_deref(), Some("bench test"));

        assert_eq!(soc(src.fetch().unwrap()), Some(1.0));
        assert!(matches!(src.fetch(), Err(SourceError::ParseError(_))));
        assert_eq!(soc(src.fetch().unwrap()), Some(2.0));
        assert!(matches!(src.fetch().unwrap(), Fetched::Exhausted));
    }

    #[test]
    fn replay_paced() {
        let t0 = Local::now();
        let lines = [
            stamped(1.0, t0),
            stamped(2.0, t0 + chrono::Duration::milliseconds(50)),
            stamped(3.0, t0 + chrono::Duration::hours(1)),
        ];
        let rec = recording(&lines);
        let mut src = open(&rec);

        assert_eq!(soc(src.fetch().unwrap()), Some(1.0));
        let mut pending = 0;
        loop {
            match src.fetch().unwrap() {
                Fetched::Pending => pending += 1,
                fetched => {
                    assert_eq!(soc(fetched), Some(2.0));
                    break;
                }
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(pending > 0);

        // an hour away
        assert!(matches!(src.fetch().unwrap(), Fetched::Pending));
    }

    #[test]
    fn reject_missing_header() {
        let mut file = tempfile::tempfile().unwrap();
        writeln!(file, "garbage").unwrap();
        use std::io::Seek;
        file.seek(std::io::SeekFrom::Start(0)).unwrap();
        assert!(matches!(
            FileSource::new(file, Path::new("garbage.json")),
            Err(SourceError::SetupError(_))
        ));
    }

    #[test]
    fn non_utf8_line_is_a_decode_error() {
        let t0 = Local::now();
        let rec = recording_bytes(&[
            b"{\"received\": \"\xff\xfe\"}".to_vec(),
            stamped(3.0, t0).into_bytes(),
        ]);
        let mut src = open(&rec).paced(false);

        let err = src.fetch().unwrap_err();
        assert!(matches!(err, SourceError::DecodeError(_)));
        assert!(!err.is_transport());
        assert_eq!(soc(src.fetch().unwrap()), Some(3.0));
        assert!(matches!(src.fetch().unwrap(), Fetched::Exhausted));
    }

    #[test]
    fn describe_names_the_path() {
        let rec = recording(&[]);
        let described = open(&rec).describe();
        assert_eq!(described, format!("recording {}", rec.path().display()));
        assert!(!described.contains("fd"));
    }
}
