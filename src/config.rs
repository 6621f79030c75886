//! Monitor configuration, resolved from the command line, an optional
//! JSON configuration file and built-in defaults, in that order.
use crate::diag;
use crate::queue::OverflowPolicy;
use crate::transport::{Address, TransportError};
use crate::ConfigOptions;

use std::convert::TryFrom;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "bms-monitor.json";

const DEFAULT_DEVICE: &str = "/dev/ttyACM0";
const DEFAULT_BAUD: u32 = 9600;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_UI_TICK_MS: u64 = 100;
const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigIntermediate {
    pub device: Option<String>,
    pub baud: Option<u32>,
    pub poll_interval_ms: Option<u64>,
    pub ui_tick_ms: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub overflow: Option<OverflowPolicy>,
}

impl ConfigIntermediate {
    /// Fills every field that is still unset from `other`.
    pub fn complete_with(&mut self, other: Self) {
        macro_rules! complete {
            ($($field:ident),+) => {
                $(
                    if self.$field.is_none() {
                        self.$field = other.$field;
                    }
                )+
            };
        }
        complete!(device, baud, poll_interval_ms, ui_tick_ms, queue_capacity, overflow);
    }

    fn from_opts(opts: &ConfigOptions) -> Self {
        Self {
            device: opts.device.clone(),
            baud: opts.baud,
            poll_interval_ms: opts.poll_interval_ms,
            ui_tick_ms: opts.ui_tick_ms,
            queue_capacity: opts.queue_capacity,
            overflow: opts.overflow,
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::ReadError(path.to_owned(), e))?;
        serde_json::from_str(&json).map_err(|e| ConfigError::DeserializationFailed(path.to_owned(), e))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub address: Address,
    pub baud: u32,
    /// How long the reader idles when no complete line is pending.
    pub poll_interval: Duration,
    /// Period of the presentation loop.
    pub ui_tick: Duration,
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {}: {1}", .0.display())]
    ReadError(PathBuf, #[source] io::Error),
    #[error("Configuration file {} could not be deserialized: {1}", .0.display())]
    DeserializationFailed(PathBuf, #[source] serde_json::Error),
    #[error("Baud rate must be non-zero")]
    ZeroBaud,
    #[error("Poll interval must be non-zero")]
    ZeroPollInterval,
    #[error("UI tick must be non-zero")]
    ZeroUiTick,
    #[error("Queue capacity must be non-zero for the {0} overflow policy")]
    ZeroCapacity(OverflowPolicy),
    #[error(transparent)]
    InvalidDevice(#[from] TransportError),
}

impl diag::DiagnosableError for ConfigError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::DeserializationFailed(..) => vec![format!(
                "Valid keys are device, baud, poll_interval_ms, ui_tick_ms, queue_capacity and overflow (one of {:?})",
                OverflowPolicy::VARIANTS
            )],
            Self::ZeroBaud => vec!["Set `baud` in the configuration file or specify --baud".to_string()],
            Self::ZeroPollInterval => vec!["Set `poll_interval_ms` in the configuration file or specify --poll-interval-ms".to_string()],
            Self::ZeroUiTick => vec!["Set `ui_tick_ms` in the configuration file or specify --ui-tick-ms".to_string()],
            Self::ZeroCapacity(_) => vec![
                "Set `queue_capacity` in the configuration file or specify --queue-capacity".to_string(),
                "Alternatively, pass --overflow unbounded".to_string(),
            ],
            Self::InvalidDevice(e) => diag::DiagnosableError::diagnose(e),
            _ => vec![],
        }
    }
}

impl TryFrom<ConfigIntermediate> for MonitorConfig {
    type Error = ConfigError;

    fn try_from(int: ConfigIntermediate) -> Result<Self, Self::Error> {
        let device = int.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string());
        let baud = int.baud.unwrap_or(DEFAULT_BAUD);
        let poll_interval_ms = int.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        let ui_tick_ms = int.ui_tick_ms.unwrap_or(DEFAULT_UI_TICK_MS);
        let queue_capacity = int.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        let overflow = int.overflow.unwrap_or(OverflowPolicy::DropOldest);

        if baud == 0 {
            return Err(ConfigError::ZeroBaud);
        }
        if poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if ui_tick_ms == 0 {
            return Err(ConfigError::ZeroUiTick);
        }
        if queue_capacity == 0 && overflow.is_bounded() {
            return Err(ConfigError::ZeroCapacity(overflow));
        }

        Ok(MonitorConfig {
            address: Address::parse(&device)?,
            baud,
            poll_interval: Duration::from_millis(poll_interval_ms),
            ui_tick: Duration::from_millis(ui_tick_ms),
            queue_capacity,
            overflow,
        })
    }
}

impl MonitorConfig {
    /// Resolves the configuration. An explicitly given configuration
    /// file must exist; the default one is only read if present.
    pub fn load(opts: &ConfigOptions) -> Result<Self, ConfigError> {
        let mut int = ConfigIntermediate::from_opts(opts);

        let file = match &opts.config {
            Some(path) => Some(ConfigIntermediate::read(path)?),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Some(ConfigIntermediate::read(Path::new(DEFAULT_CONFIG_FILE))?)
            }
            None => None,
        };
        if let Some(file) = file {
            int.complete_with(file);
        }

        MonitorConfig::try_from(int)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn opts() -> ConfigOptions {
        ConfigOptions {
            config: None,
            device: None,
            baud: None,
            poll_interval_ms: None,
            ui_tick_ms: None,
            queue_capacity: None,
            overflow: None,
        }
    }

    fn config_file(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults() {
        let config = MonitorConfig::try_from(ConfigIntermediate::default()).unwrap();
        assert_eq!(
            config,
            MonitorConfig {
                address: Address::Serial("/dev/ttyACM0".to_string()),
                baud: 9600,
                poll_interval: Duration::from_millis(100),
                ui_tick: Duration::from_millis(100),
                queue_capacity: 64,
                overflow: OverflowPolicy::DropOldest,
            }
        );
    }

    #[test]
    fn cli_overrides_file() {
        let file = config_file(
            r#"{"device": "socket://127.0.0.1:7000", "baud": 115200, "ui_tick_ms": 50, "overflow": "block"}"#,
        );
        let opts = ConfigOptions {
            config: Some(file.path().to_owned()),
            baud: Some(19200),
            overflow: Some(OverflowPolicy::Unbounded),
            ..opts()
        };

        let config = MonitorConfig::load(&opts).unwrap();
        assert_eq!(
            config.address,
            Address::Socket {
                host: "127.0.0.1".to_string(),
                port: 7000
            }
        );
        assert_eq!(config.baud, 19200);
        assert_eq!(config.ui_tick, Duration::from_millis(50));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.overflow, OverflowPolicy::Unbounded);
    }

    #[test]
    fn missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let opts = ConfigOptions {
            config: Some(dir.path().join("nope.json")),
            ..opts()
        };
        assert!(matches!(MonitorConfig::load(&opts), Err(ConfigError::ReadError(..))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = config_file(r#"{"device": "/dev/ttyUSB0", "parity": "even"}"#);
        let opts = ConfigOptions {
            config: Some(file.path().to_owned()),
            ..opts()
        };
        assert!(matches!(
            MonitorConfig::load(&opts),
            Err(ConfigError::DeserializationFailed(..))
        ));
    }

    #[test]
    fn invalid_values() {
        let with = |f: fn(&mut ConfigIntermediate)| {
            let mut int = ConfigIntermediate::default();
            f(&mut int);
            MonitorConfig::try_from(int)
        };

        assert!(matches!(with(|c| c.baud = Some(0)), Err(ConfigError::ZeroBaud)));
        assert!(matches!(
            with(|c| c.poll_interval_ms = Some(0)),
            Err(ConfigError::ZeroPollInterval)
        ));
        assert!(matches!(with(|c| c.ui_tick_ms = Some(0)), Err(ConfigError::ZeroUiTick)));
        assert!(matches!(
            with(|c| c.queue_capacity = Some(0)),
            Err(ConfigError::ZeroCapacity(OverflowPolicy::DropOldest))
        ));
        assert!(matches!(
            with(|c| c.device = Some("socket://localhost".to_string())),
            Err(ConfigError::InvalidDevice(_))
        ));
    }

    #[test]
    fn zero_capacity_is_fine_when_unbounded() {
        let config = MonitorConfig::try_from(ConfigIntermediate {
            queue_capacity: Some(0),
            overflow: Some(OverflowPolicy::Unbounded),
            ..ConfigIntermediate::default()
        })
        .unwrap();
        assert_eq!(config.overflow, OverflowPolicy::Unbounded);
    }
}
