use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Local;
use crossbeam_channel as channel;
use structopt::StructOpt;
use thiserror::Error;

mod command;
mod config;
mod diag;
mod input;
mod log;
mod monitor;
mod queue;
mod reader;
mod readout;
mod recording;
mod sinks;
mod sources;
mod transport;

use command::CommandSender;
use config::MonitorConfig;
use diag::DiagnosableError;
use input::{Input, KeyboardInput, NoInput};
use monitor::Exit;
use queue::{OverflowPolicy, RecordReceiver, RecordSender};
use reader::{ReaderHandle, ReaderStats};
use recording::RecordingMetadata;

/// Bound on how long a single blocking transport operation may take.
const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, StructOpt)]
#[structopt(about = "Live monitor for an 8-cell battery management system")]
struct Opts {
    #[structopt(subcommand)]
    cmd: Command,
}

/// Display live telemetry from a BMS and send it control commands.
#[derive(StructOpt, Debug)]
#[structopt(after_help = input::KEY_HELP)]
struct MonitorOptions {
    /// Also record displayed telemetry to file for later replay.
    #[structopt(long = "record")]
    record: bool,

    /// Output directory for recordings.
    #[structopt(long = "record-dir", default_value = "bms-recordings", parse(from_os_str))]
    record_dir: PathBuf,

    /// Arbitrary comment that describes the recording.
    #[structopt(long = "comment", short = "c", requires("record"))]
    comment: Option<String>,

    /// Remove all previous recordings from <record-dir>.
    #[structopt(long = "clear-recordings", requires("record"))]
    remove_prev_recordings: bool,

    /// Do not read keys from the terminal. Quit with SIGINT instead.
    #[structopt(long = "no-input")]
    no_input: bool,

    #[structopt(flatten)]
    config: ConfigOptions,
}

/// Replay a previously recorded telemetry stream.
#[derive(StructOpt, Debug)]
struct ReplayOptions {
    #[structopt(name = "list", long = "list", short = "l")]
    list: bool,

    /// Relative path to recording to replay.
    #[structopt(name = "file", long = "file", parse(from_os_str))]
    file: Option<PathBuf>,

    #[structopt(required_unless_one(&["list", "file"]))]
    index: Option<usize>,

    /// Directory where previous recordings are found.
    #[structopt(long = "record-dir", default_value = "bms-recordings", parse(from_os_str))]
    record_dir: PathBuf,

    /// Release records as fast as they are displayed instead of at
    /// their recorded pace.
    #[structopt(long = "fast")]
    fast: bool,

    /// Do not read keys from the terminal. Quit with SIGINT instead.
    #[structopt(long = "no-input")]
    no_input: bool,

    #[structopt(flatten)]
    config: ConfigOptions,
}

#[derive(StructOpt, Debug)]
pub struct ConfigOptions {
    /// JSON configuration file. By default, ./bms-monitor.json is read
    /// if it exists.
    #[structopt(long = "config", parse(from_os_str))]
    config: Option<PathBuf>,

    /// Serial device over which the BMS is reached, or
    /// socket://<host>:<port> for a TCP endpoint.
    #[structopt(long = "device", short = "d")]
    device: Option<String>,

    /// Baud rate of the serial device.
    #[structopt(long = "baud")]
    baud: Option<u32>,

    /// How long the reader idles when no complete line is pending.
    #[structopt(long = "poll-interval-ms")]
    poll_interval_ms: Option<u64>,

    /// Period of the display and key polling loop.
    #[structopt(long = "ui-tick-ms")]
    ui_tick_ms: Option<u64>,

    /// How many records may wait for display.
    #[structopt(long = "queue-capacity")]
    queue_capacity: Option<usize>,

    /// What to do with new records when the queue is full.
    #[structopt(long = "overflow", possible_values = &OverflowPolicy::VARIANTS)]
    overflow: Option<OverflowPolicy>,
}

#[derive(StructOpt, Debug)]
enum Command {
    Monitor(MonitorOptions),
    Replay(ReplayOptions),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    // transparent errors
    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),
    #[error(transparent)]
    SourceError(#[from] sources::SourceError),
    #[error(transparent)]
    SinkError(#[from] sinks::SinkError),
    #[error(transparent)]
    ReaderError(#[from] reader::ReaderError),
    #[error(transparent)]
    InputError(#[from] input::InputError),

    // everything else
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl diag::DiagnosableError for MonitorError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            MonitorError::ConfigError(_) => vec![
                "Command line options take precedence over the configuration file".to_string(),
            ],
            _ => vec![],
        }
    }
}

impl MonitorError {
    pub fn render(&self) {
        log::err(match self {
            Self::Other(e) => format!("{:#}", e),
            e => e.to_string(),
        });

        // print eventual hints
        type DE = dyn DiagnosableError;
        for hint in self.diagnose().iter().chain(
            match self {
                Self::ConfigError(e) => Some(e as &DE),
                Self::SourceError(e) => Some(e as &DE),
                Self::SinkError(e) => Some(e as &DE),
                Self::ReaderError(e) => Some(e as &DE),
                Self::InputError(e) => Some(e as &DE),
                _ => None,
            }
            .map(|e| e.diagnose())
            .unwrap_or_default()
            .iter(),
        ) {
            log::hint(hint.to_owned());
        }
    }
}

fn main() {
    if let Err(e) = main_try() {
        e.render();
        std::process::exit(1);
    }
}

/// Everything the presentation loop runs against, for either subcommand.
struct Session {
    /// Source of the telemetry, for the summary.
    description: String,
    records: RecordReceiver,
    /// Absent when no transport could be opened.
    reader: Option<ReaderHandle>,
    /// Producer end of the queue when no reader owns it, so that the
    /// queue is not mistaken for an exhausted source.
    parked: Option<RecordSender>,
    commands: CommandSender,
    sinks: Vec<Box<dyn sinks::Sink>>,
    ui_tick: Duration,
    no_input: bool,
}

fn main_try() -> Result<(), MonitorError> {
    let opts = Opts::from_args();

    let session = match opts.cmd {
        Command::Monitor(ref opts) => monitor(opts)?,
        Command::Replay(ref opts) => match replay(opts)? {
            Some(session) => session,
            None => return Ok(()), // NOTE --list was passed
        },
    };
    let Session {
        description,
        records,
        reader,
        parked,
        mut commands,
        sinks,
        ui_tick,
        no_input,
    } = session;

    // Setup SIGINT handler.
    let (tx, halt) = channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("Failed to install SIGINT handler")?;

    // Raw mode is restored when the input is dropped, before anything
    // else is torn down.
    let mut input: Box<dyn Input> = if no_input {
        Box::new(NoInput)
    } else {
        log::status(
            "Keys",
            input::KEY_HELP.lines().skip(1).map(str::trim).collect::<Vec<_>>().join("\n"),
        );
        Box::new(KeyboardInput::new()?)
    };

    // Record the run-time duration of the below run_loop.
    let instant = Instant::now();
    let outcome = monitor::run_loop(&records, sinks, &mut commands, input.as_mut(), &halt, ui_tick);
    let duration = instant.elapsed();

    drop(input);
    let reader_stats = match reader {
        Some(reader) => reader.shutdown()?,
        None => ReaderStats::default(),
    };
    drop(commands);
    drop(parked);

    let (stats, exit) = outcome?;
    match exit {
        Exit::Quit | Exit::SourceFinished => (),
        Exit::Halted => log::status("Halted", "on SIGINT".to_string()),
        Exit::InputLost => log::warn("lost terminal input, shutting down".to_string()),
    }
    log::status(
        match opts.cmd {
            Command::Monitor(_) => "Monitored",
            Command::Replay(_) => "Replayed",
        },
        format!(
            "{}.",
            format_status_message(&description, &reader_stats, &stats, &duration)
        ),
    );

    Ok(())
}

fn monitor(opts: &MonitorOptions) -> Result<Session, MonitorError> {
    let config = MonitorConfig::load(&opts.config)?;
    let (tx, records) = queue::channel(config.queue_capacity, config.overflow);

    let opened = transport::open(&config.address, config.baud, TRANSPORT_TIMEOUT)
        .and_then(transport::split);
    let (description, reader, parked, commands) = match opened {
        Ok((read, write)) => {
            let description = read.describe();
            log::status("Connected", format!("to {}", description));
            let reader = ReaderHandle::spawn(
                Box::new(sources::TransportSource::new(read)),
                tx,
                config.poll_interval,
            )?;
            (description, Some(reader), None, CommandSender::new(Some(write)))
        }
        Err(e) => {
            log::warn(format!("{}; continuing without telemetry", e));
            for hint in e.diagnose() {
                log::hint(hint);
            }
            (config.address.to_string(), None, Some(tx), CommandSender::new(None))
        }
    };

    let mut sinks: Vec<Box<dyn sinks::Sink>> = vec![Box::new(sinks::TerminalSink::new())];
    if opts.record {
        let metadata = RecordingMetadata {
            source: description.clone(),
            started: Local::now(),
            comment: opts.comment.clone(),
        };
        let sink = sinks::FileSink::generate_recording_file(
            &opts.record_dir,
            &metadata,
            opts.remove_prev_recordings,
        )?;
        log::status("Recording", format!("to {}", sink.path().display()));
        sinks.push(Box::new(sink));
    }

    Ok(Session {
        description,
        records,
        reader,
        parked,
        commands,
        sinks,
        ui_tick: config.ui_tick,
        no_input: opts.no_input,
    })
}

fn replay(opts: &ReplayOptions) -> Result<Option<Session>, MonitorError> {
    let open = |path: &PathBuf| -> Result<sources::FileSource, MonitorError> {
        let file = fs::OpenOptions::new()
            .read(true)
            .open(path)
            .with_context(|| format!("Failed to open recording {}", path.display()))?;
        Ok(sources::FileSource::new(file, path)?)
    };
    let index = || {
        recording::find_recordings(&opts.record_dir)
            .with_context(|| format!("Failed to index recordings in {}", opts.record_dir.display()))
    };

    let path = match opts {
        ReplayOptions { list: true, .. } => {
            for (i, path) in index()?.iter().enumerate() {
                let metadata = open(path)?.metadata();
                println!(
                    "{}\t{}\t{}\t{:?}",
                    i,
                    path.display(),
                    metadata.started.format("%Y-%m-%d %H:%M:%S"),
                    metadata.comment
                );
            }

            return Ok(None);
        }
        ReplayOptions {
            file: Some(file), ..
        } => file.clone(),
        ReplayOptions {
            index: Some(idx), ..
        } => index()?
            .into_iter()
            .nth(*idx)
            .with_context(|| format!("No recording with index {}", *idx))?,
        _ => unreachable!(),
    };

    let config = MonitorConfig::load(&opts.config)?;
    let source = open(&path)?.paced(!opts.fast);
    let metadata = source.metadata();
    log::status(
        "Replaying",
        format!(
            "{} (recorded from {} at {}){}",
            path.display(),
            metadata.source,
            metadata.started.format("%Y-%m-%d %H:%M:%S"),
            metadata
                .comment
                .as_ref()
                .map(|c| format!(": {}", c))
                .unwrap_or_default()
        ),
    );

    // A recording is never overrun: the reader waits for the display.
    let (tx, records) = queue::channel(config.queue_capacity.max(1), OverflowPolicy::Block);
    let reader = ReaderHandle::spawn(Box::new(source), tx, config.poll_interval)?;

    Ok(Some(Session {
        description: format!("{}", path.display()),
        records,
        reader: Some(reader),
        parked: None,
        commands: CommandSender::new(None),
        sinks: vec![Box::new(sinks::TerminalSink::new())],
        ui_tick: config.ui_tick,
        no_input: opts.no_input,
    }))
}

fn format_duration(duration: &Duration) -> String {
    match duration.as_secs() {
        duration if duration >= 60 * 60 => {
            let secs = duration % 60;
            let mins = (duration / 60) % 60;
            let hours = duration / 60 / 60;

            format!("{}h {}min {}s", hours, mins, secs)
        }
        duration if duration >= 60 => {
            let secs = duration % 60;
            let mins = (duration / 60) % 60;

            format!("{}min {}s", mins, secs)
        }
        duration => format!("{}s", duration),
    }
}

fn format_status_message(
    description: &str,
    reader: &ReaderStats,
    stats: &monitor::Stats,
    duration: &Duration,
) -> String {
    format!(
        "{}: {} records received, {} displayed in {time} (~{records_per_sec:.1} records/s; {} malformed, {} dropped, {} transport errors); {} commands sent, {} failed; {sinks}",
        description,
        reader.received,
        stats.displayed,
        reader.malformed,
        reader.dropped,
        reader.transport_errors,
        stats.commands_sent,
        stats.commands_failed,
        time = format_duration(duration),
        records_per_sec = stats.displayed as f32 / duration.as_secs_f32().max(1.0),
        sinks = format!("{}/{} sinks operational", stats.sinks.0, stats.sinks.1),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(format_duration(&Duration::from_millis(999)), "0s");
        assert_eq!(format_duration(&Duration::from_secs(59)), "59s");
        assert_eq!(format_duration(&Duration::from_secs(61)), "1min 1s");
        assert_eq!(format_duration(&Duration::from_secs(2 * 3600 + 5 * 60 + 7)), "2h 5min 7s");
    }

    #[test]
    fn status_message() {
        let reader = ReaderStats {
            received: 12,
            malformed: 1,
            dropped: 2,
            transport_errors: 0,
        };
        let stats = monitor::Stats {
            displayed: 10,
            commands_sent: 3,
            commands_failed: 1,
            sinks: (1, 2),
        };

        assert_eq!(
            format_status_message("socket://127.0.0.1:7000", &reader, &stats, &Duration::from_secs(5)),
            "socket://127.0.0.1:7000: 12 records received, 10 displayed in 5s (~2.0 records/s; 1 malformed, 2 dropped, 0 transport errors); 3 commands sent, 1 failed; 1/2 sinks operational"
        );
    }

    #[test]
    fn cli_parses() {
        let opts = Opts::from_iter_safe(&[
            "bms-monitor",
            "monitor",
            "--device",
            "socket://127.0.0.1:7000",
            "--overflow",
            "block",
            "--record",
            "-c",
            "bench",
        ])
        .unwrap();
        match opts.cmd {
            Command::Monitor(opts) => {
                assert!(opts.record);
                assert_eq!(opts.comment.as_deref(), Some("bench"));
                assert_eq!(opts.record_dir, PathBuf::from("bms-recordings"));
                assert_eq!(opts.config.overflow, Some(OverflowPolicy::Block));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(Opts::from_iter_safe(&["bms-monitor", "replay"]).is_err());
        assert!(Opts::from_iter_safe(&["bms-monitor", "monitor", "--overflow", "sometimes"]).is_err());
        assert!(Opts::from_iter_safe(&["bms-monitor", "monitor", "--clear-recordings"]).is_err());
        assert!(Opts::from_iter_safe(&["bms-monitor", "replay", "--list"]).is_ok());
        assert!(Opts::from_iter_safe(&["bms-monitor", "replay", "3"]).is_ok());
    }
}
