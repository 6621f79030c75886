//! Types exchanged between a BMS telemetry source and the monitor.
//!
//! Telemetry travels as newline-delimited JSON objects, one
//! [`TelemetryRecord`] per line. Control travels the other way as
//! plaintext [`Command`] tokens, also newline-terminated.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Number of cells, and thus of temperature and voltage readings, in a
/// record.
pub const CELLS: usize = 8;

/// Status label reported by the BMS.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatteryState {
    Normal,
    Warning,
    Error,
    Critical,
}

impl BatteryState {
    pub const ALL: [BatteryState; 4] = [
        BatteryState::Normal,
        BatteryState::Warning,
        BatteryState::Error,
        BatteryState::Critical,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for BatteryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BatteryState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter().find(|state| state.label() == s).copied().ok_or(())
    }
}

/// Labels we do not know of are read as absent; the rest of the record
/// is still usable.
fn known_state<'de, D>(deserializer: D) -> Result<Option<BatteryState>, D::Error>
where
    D: Deserializer<'de>,
{
    let label = Option::<String>::deserialize(deserializer)?;
    Ok(label.and_then(|label| label.parse().ok()))
}

/// One snapshot of battery sensor and status values.
///
/// Every field is optional: a source may omit any of them, and consumers
/// are expected to render a placeholder in its place. Fields that are
/// present are validated on decode; in particular
/// [`TelemetryRecord::temperatures`] and [`TelemetryRecord::voltages`]
/// must hold exactly [`CELLS`] values.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TelemetryRecord {
    /// Percent, in `[0, 100]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_of_charge: Option<f64>,

    /// Absent also when the source reports a label outside
    /// [`BatteryState::ALL`].
    #[serde(
        default,
        deserialize_with = "known_state",
        skip_serializing_if = "Option::is_none"
    )]
    pub battery_state: Option<BatteryState>,

    /// Amperes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_current: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efuse_state: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_status: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detection: Option<u8>,

    /// Per-cell temperatures in °C.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperatures: Option<[f64; CELLS]>,

    /// Per-cell voltages in V.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltages: Option<[f64; CELLS]>,
}

impl TelemetryRecord {
    /// Parses a single line of wire text. Surrounding whitespace,
    /// including the line terminator, is ignored.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }

    /// Serializes the record as a single newline-terminated line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        Ok(serde_json::to_string(self)? + "\n")
    }

    /// Whether every field is populated.
    pub fn is_complete(&self) -> bool {
        self.state_of_charge.is_some()
            && self.battery_state.is_some()
            && self.output_current.is_some()
            && self.efuse_state.is_some()
            && self.balance_status.is_some()
            && self.error_detection.is_some()
            && self.temperatures.is_some()
            && self.voltages.is_some()
    }
}

/// Control commands understood by the BMS. Delivery is best-effort: no
/// acknowledgement is ever sent back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `BB_Start`: start cell balancing.
    BalancingStart,
    /// `BB_Stop`: stop cell balancing.
    BalancingStop,
    /// `ED_ON`: enable error detection.
    ErrorDetectionOn,
    /// `ED_OFF`: disable error detection.
    ErrorDetectionOff,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::BalancingStart,
        Command::BalancingStop,
        Command::ErrorDetectionOn,
        Command::ErrorDetectionOff,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Self::BalancingStart => "BB_Start",
            Self::BalancingStop => "BB_Stop",
            Self::ErrorDetectionOn => "ED_ON",
            Self::ErrorDetectionOff => "ED_OFF",
        }
    }

    /// The token followed by the line terminator, as written to the wire.
    pub fn to_line(&self) -> String {
        format!("{}\n", self.token())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown command token {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Self::ALL
            .iter()
            .find(|c| c.token() == token)
            .copied()
            .ok_or_else(|| UnknownCommand(token.to_string()))
    }
}
