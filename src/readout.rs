//! Maps a [`TelemetryRecord`] to the labelled text shown on the display.
//! Each field has a fixed rendering rule; absent fields render as
//! [`PLACEHOLDER`].
use bms_monitor_api::TelemetryRecord;

pub const PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadoutField {
    pub label: &'static str,
    pub value: String,
}

/// Display text for every field of a record, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readout {
    pub fields: Vec<ReadoutField>,
}

fn or_placeholder<T>(value: Option<T>, render: impl FnOnce(T) -> String) -> String {
    value.map(render).unwrap_or_else(|| PLACEHOLDER.to_string())
}

fn cells(values: &[f64], decimals: usize) -> String {
    values
        .iter()
        .map(|v| format!("{:.*}", decimals, v))
        .collect::<Vec<_>>()
        .join(" ")
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

impl From<&TelemetryRecord> for Readout {
    fn from(r: &TelemetryRecord) -> Self {
        let field = |label, value| ReadoutField { label, value };

        Self {
            fields: vec![
                field(
                    "State of charge",
                    or_placeholder(r.state_of_charge, |soc| format!("{:.2} %", soc)),
                ),
                field(
                    "Battery state",
                    or_placeholder(r.battery_state, |state| state.to_string()),
                ),
                field(
                    "Output current",
                    or_placeholder(r.output_current, |a| format!("{:.2} A", a)),
                ),
                field(
                    "eFuse",
                    or_placeholder(r.efuse_state, |efuse| match efuse {
                        0 => "open".to_string(),
                        1 => "closed".to_string(),
                        code => format!("code {}", code),
                    }),
                ),
                field(
                    "Balancing",
                    or_placeholder(r.balance_status, |status| match status {
                        0 => "idle".to_string(),
                        code => format!("active (code {})", code),
                    }),
                ),
                field(
                    "Error detection",
                    or_placeholder(r.error_detection, |detection| match detection {
                        0 => "Off".to_string(),
                        code => format!("On (code {})", code),
                    }),
                ),
                field(
                    "Cell voltages",
                    or_placeholder(r.voltages, |v| {
                        format!(
                            "{} V (min {:.3}, max {:.3}, pack {:.3})",
                            cells(&v, 3),
                            min(&v),
                            max(&v),
                            v.iter().sum::<f64>()
                        )
                    }),
                ),
                field(
                    "Temperatures",
                    or_placeholder(r.temperatures, |t| {
                        format!("{} °C (max {:.1})", cells(&t, 1), max(&t))
                    }),
                ),
            ],
        }
    }
}

impl Readout {
    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.label == label)
            .map(|f| f.value.as_str())
    }

    /// One `label: value` line per field, labels aligned.
    pub fn lines(&self) -> Vec<String> {
        let width = self.fields.iter().map(|f| f.label.len()).max().unwrap_or(0);
        self.fields
            .iter()
            .map(|f| format!("{:<width$}  {}", f.label, f.value, width = width))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bms_monitor_api::{BatteryState, CELLS};

    #[test]
    fn full_record() {
        let mut voltages = [3.7; CELLS];
        voltages[0] = 3.0;
        voltages[7] = 4.2;
        let record = TelemetryRecord {
            state_of_charge: Some(55.5),
            battery_state: Some(BatteryState::Warning),
            output_current: Some(2.3),
            efuse_state: Some(1),
            balance_status: Some(3),
            error_detection: Some(0),
            temperatures: Some([25.0, 26.0, 27.0, 28.0, 29.0, 30.0, 31.0, 39.9]),
            voltages: Some(voltages),
        };
        let readout = Readout::from(&record);

        assert_eq!(readout.get("State of charge"), Some("55.50 %"));
        assert_eq!(readout.get("Battery state"), Some("WARNING"));
        assert_eq!(readout.get("Output current"), Some("2.30 A"));
        assert_eq!(readout.get("eFuse"), Some("closed"));
        assert_eq!(readout.get("Balancing"), Some("active (code 3)"));
        assert_eq!(readout.get("Error detection"), Some("Off"));
        assert_eq!(
            readout.get("Cell voltages"),
            Some("3.000 3.700 3.700 3.700 3.700 3.700 3.700 4.200 V (min 3.000, max 4.200, pack 29.400)")
        );
        assert_eq!(
            readout.get("Temperatures"),
            Some("25.0 26.0 27.0 28.0 29.0 30.0 31.0 39.9 °C (max 39.9)")
        );
    }

    #[test]
    fn missing_fields_render_placeholder() {
        let readout = Readout::from(&TelemetryRecord {
            error_detection: Some(2),
            ..TelemetryRecord::default()
        });

        assert_eq!(readout.fields.len(), 8);
        assert_eq!(readout.get("Error detection"), Some("On (code 2)"));
        for field in readout.fields.iter().filter(|f| f.label != "Error detection") {
            assert_eq!(field.value, PLACEHOLDER, "{}", field.label);
        }
    }

    #[test]
    fn lines_are_aligned() {
        let lines = Readout::from(&TelemetryRecord::default()).lines();
        assert_eq!(lines.len(), 8);
        assert!(lines.iter().all(|l| l.ends_with("  -")));
        let value_column = lines[0].len() - 1;
        assert!(lines.iter().all(|l| l.len() - 1 == value_column));
    }
}
