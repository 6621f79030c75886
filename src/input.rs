//! User input for the presentation loop: command keys and quit.
use crate::diag;

use std::time::Duration;

use bms_monitor_api::Command;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal;
use thiserror::Error;

pub const KEY_HELP: &str = "KEYS:
    1    send BB_Start (start balancing)
    2    send BB_Stop (stop balancing)
    3    send ED_ON (enable error detection)
    4    send ED_OFF (disable error detection)
    q    quit (also Esc, Ctrl-C)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    Command(Command),
    Quit,
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to configure terminal for key input: {0}")]
    TerminalError(#[source] crossterm::ErrorKind),
    #[error("Failed to read input event: {0}")]
    EventError(#[source] crossterm::ErrorKind),
}

impl diag::DiagnosableError for InputError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::TerminalError(_) => vec!["Pass --no-input when not running in a terminal".to_string()],
            _ => vec![],
        }
    }
}

pub trait Input {
    /// Waits up to `timeout` for the next recognized event.
    fn poll(&mut self, timeout: Duration) -> Result<Option<UiEvent>, InputError>;
}

/// Maps a key press to the event it stands for, if any.
pub fn map_key(key: KeyEvent) -> Option<UiEvent> {
    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(UiEvent::Quit),
        (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => Some(UiEvent::Quit),
        (KeyCode::Char('1'), _) => Some(UiEvent::Command(Command::BalancingStart)),
        (KeyCode::Char('2'), _) => Some(UiEvent::Command(Command::BalancingStop)),
        (KeyCode::Char('3'), _) => Some(UiEvent::Command(Command::ErrorDetectionOn)),
        (KeyCode::Char('4'), _) => Some(UiEvent::Command(Command::ErrorDetectionOff)),
        _ => None,
    }
}

/// Key presses read from the controlling terminal, which is kept in raw
/// mode for as long as this lives.
pub struct KeyboardInput {
    _private: (),
}

impl KeyboardInput {
    pub fn new() -> Result<Self, InputError> {
        terminal::enable_raw_mode().map_err(InputError::TerminalError)?;
        Ok(Self { _private: () })
    }
}

impl Drop for KeyboardInput {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl Input for KeyboardInput {
    fn poll(&mut self, timeout: Duration) -> Result<Option<UiEvent>, InputError> {
        if !event::poll(timeout).map_err(InputError::EventError)? {
            return Ok(None);
        }

        match event::read().map_err(InputError::EventError)? {
            Event::Key(key) => Ok(map_key(key)),
            _ => Ok(None),
        }
    }
}

/// No interactive input: every poll simply waits out the tick. Used when
/// stdin is not a terminal; SIGINT still stops the monitor.
pub struct NoInput;

impl Input for NoInput {
    fn poll(&mut self, timeout: Duration) -> Result<Option<UiEvent>, InputError> {
        std::thread::sleep(timeout);
        Ok(None)
    }
}
