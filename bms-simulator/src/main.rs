use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::time::Duration;

use anyhow::{Context, Result};
use bms_monitor_api::Command;
use structopt::StructOpt;

mod generator;

use generator::{Controls, Generator};

/// Emit synthetic BMS telemetry to a single TCP client, one JSON line
/// per interval.
#[derive(Debug, StructOpt)]
struct Opts {
    /// Address to listen on. Point the monitor at
    /// `socket://<address>`.
    #[structopt(long = "bind", default_value = "127.0.0.1:7000")]
    bind: String,

    /// Milliseconds between two records.
    #[structopt(long = "interval-ms", default_value = "1000")]
    interval_ms: u64,

    /// Stop after emitting this many records.
    #[structopt(long = "count")]
    count: Option<u64>,
}

fn main() -> Result<()> {
    let opts = Opts::from_args();

    let listener = TcpListener::bind(&opts.bind)
        .with_context(|| format!("Failed to bind {}", opts.bind))?;
    eprintln!("Waiting for a connection on {}...", opts.bind);
    let sent = serve(&listener, &opts)?;

    eprintln!("Sent {} records, exiting", sent);
    Ok(())
}

/// Accepts a single client and streams records to it until `opts.count`
/// is reached. Returns how many records were sent.
fn serve(listener: &TcpListener, opts: &Opts) -> Result<u64> {
    let (mut conn, peer) = listener.accept().context("Failed to accept()")?;
    eprintln!("Connection established with {}", peer);

    let controls = Controls::default();
    {
        let conn = conn
            .try_clone()
            .context("Failed to clone connection for the command listener")?;
        let controls = controls.clone();
        std::thread::spawn(move || listen_for_commands(conn, controls));
    }

    let mut generator = Generator::new(controls);
    let mut sent = 0;
    while opts.count.map_or(true, |count| sent < count) {
        let line = generator
            .next_record()
            .to_line()
            .context("Failed to serialize record")?;
        conn.write_all(line.as_bytes())
            .context("Failed to write record to client")?;
        sent += 1;

        std::thread::sleep(Duration::from_millis(opts.interval_ms));
    }

    // Also ends the command listener.
    let _ = conn.shutdown(Shutdown::Both);
    Ok(sent)
}

/// Applies command lines received from the client until it disconnects.
fn listen_for_commands(conn: TcpStream, controls: Controls) {
    for line in BufReader::new(conn).lines() {
        match line {
            Ok(line) if line.trim().is_empty() => (),
            Ok(line) => match line.parse::<Command>() {
                Ok(command) => {
                    eprintln!("Received command {}", command);
                    controls.apply(command);
                }
                Err(e) => eprintln!("{}, ignoring...", e),
            },
            Err(e) => {
                eprintln!("Failed to read command: {}", e);
                break;
            }
        }
    }
}
