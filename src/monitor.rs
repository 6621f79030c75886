//! The presentation loop: polls user input on a fixed tick, forwards
//! commands to the device, and drains the oldest queued record to all
//! sinks.
use crate::command::{CommandSender, Delivery};
use crate::input::{Input, UiEvent};
use crate::log;
use crate::queue::{Popped, RecordReceiver};
use crate::sinks::Sink;

use std::time::Duration;

use anyhow::bail;
use crossbeam_channel as channel;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// How many records were drained to the sinks.
    pub displayed: usize,
    pub commands_sent: usize,
    pub commands_failed: usize,
    /// How many sinks remained functional until the end, and how many we
    /// started with.
    pub sinks: (usize, usize),
}

/// Why the presentation loop ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Exit {
    /// The user asked to quit.
    Quit,
    /// SIGINT was received.
    Halted,
    /// The source is exhausted and every record was displayed.
    SourceFinished,
    /// Input could not be read anymore.
    InputLost,
}

pub fn run_loop(
    records: &RecordReceiver,
    mut sinks: Vec<Box<dyn Sink>>,
    commands: &mut CommandSender,
    input: &mut dyn Input,
    halt: &channel::Receiver<()>,
    ui_tick: Duration,
) -> Result<(Stats, Exit), anyhow::Error> {
    let mut stats = Stats {
        sinks: (sinks.len(), sinks.len()),
        ..Stats::default()
    };

    loop {
        if halt.try_recv().is_ok() {
            return Ok((stats, Exit::Halted));
        }

        match input.poll(ui_tick) {
            Ok(Some(UiEvent::Quit)) => return Ok((stats, Exit::Quit)),
            Ok(Some(UiEvent::Command(command))) => match commands.send(command) {
                Delivery::Sent => stats.commands_sent += 1,
                Delivery::Failed => stats.commands_failed += 1,
                Delivery::NoTransport => {
                    log::warn(format!("no transport is open, {} was not sent", command))
                }
            },
            Ok(None) => (),
            Err(e) => {
                log::err(format!("{}", e));
                return Ok((stats, Exit::InputLost));
            }
        }

        match records.pop() {
            Popped::Record(record) => {
                stats.displayed += 1;

                // Keep tabs on which sinks have broken during drain, if any.
                sinks.retain_mut(|sink| match sink.drain(&record) {
                    Ok(()) => true,
                    Err(e) => {
                        log::err(format!(
                            "failed to drain telemetry to {}: {}",
                            sink.describe(),
                            e
                        ));
                        false
                    }
                });
                stats.sinks.0 = sinks.len();
                if sinks.is_empty() {
                    bail!("All sinks are broken. Cannot continue.");
                }
            }
            Popped::Empty => (),
            Popped::Closed => return Ok((stats, Exit::SourceFinished)),
        }
    }
}
