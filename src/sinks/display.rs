//! The display surface: each record is rendered to the terminal as a
//! block of aligned `label value` lines.
use crate::log;
use crate::readout::Readout;
use crate::sinks::{Sink, SinkError};

use bms_monitor_api::TelemetryRecord;
use chrono::Local;

#[derive(Default)]
pub struct TerminalSink {
    rendered: usize,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for TerminalSink {
    fn drain(&mut self, record: &TelemetryRecord) -> Result<(), SinkError> {
        self.rendered += 1;
        let mut msg = format!(
            "#{} at {}",
            self.rendered,
            Local::now().format("%H:%M:%S")
        );
        for line in Readout::from(record).lines() {
            msg.push('\n');
            msg.push_str(&line);
        }
        log::telemetry(msg);

        Ok(())
    }

    fn describe(&self) -> String {
        "terminal display".to_string()
    }
}
