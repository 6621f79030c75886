//! Auxilliary functions for logging information to `stderr`.
//!
//! Every line is started at column zero explicitly so that output stays
//! aligned while the terminal is in raw mode.
use colored::Colorize;
use crossterm::{
    cursor,
    terminal::{Clear, ClearType},
    ExecutableCommand,
};
use std::io::stderr;

fn indent_with(header: colored::ColoredString, msg: String) {
    // clear current line
    let _ = stderr().execute(Clear(ClearType::CurrentLine));

    for (i, line) in msg.lines().enumerate() {
        let _ = stderr().execute(cursor::MoveToColumn(0));
        if i == 0 {
            eprintln!("{:>12} {}", header, line);
        } else {
            eprintln!("{:>12} {}", " ", line);
        }
    }
    let _ = stderr().execute(cursor::MoveToColumn(0));
}

pub fn status(header: &str, msg: String) {
    indent_with(header.green().bold(), msg);
}

pub fn telemetry(msg: String) {
    indent_with("Telemetry".cyan().bold(), msg);
}

pub fn warn(msg: String) {
    indent_with("Warning".yellow().bold(), msg);
}

pub fn err(msg: String) {
    indent_with("Error".red().bold(), msg);
}

pub fn hint(msg: String) {
    indent_with("Hint".blue().bold(), msg);
}
