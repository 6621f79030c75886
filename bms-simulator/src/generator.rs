//! Random telemetry generator. Values are plausible, not physical: each
//! field is drawn independently on every tick.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bms_monitor_api::{BatteryState, Command, TelemetryRecord, CELLS};
use rand::prelude::*;

/// Device behavior that the monitor can toggle with commands.
#[derive(Debug, Clone)]
pub struct Controls {
    balancing: Arc<AtomicBool>,
    error_detection: Arc<AtomicBool>,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            balancing: Arc::new(AtomicBool::new(true)),
            error_detection: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Controls {
    pub fn apply(&self, command: Command) {
        let (flag, value) = match command {
            Command::BalancingStart => (&self.balancing, true),
            Command::BalancingStop => (&self.balancing, false),
            Command::ErrorDetectionOn => (&self.error_detection, true),
            Command::ErrorDetectionOff => (&self.error_detection, false),
        };
        flag.store(value, Ordering::SeqCst);
    }

    pub fn balancing(&self) -> bool {
        self.balancing.load(Ordering::SeqCst)
    }

    pub fn error_detection(&self) -> bool {
        self.error_detection.load(Ordering::SeqCst)
    }
}

pub struct Generator<R: Rng> {
    rng: R,
    controls: Controls,
}

impl Generator<ThreadRng> {
    pub fn new(controls: Controls) -> Self {
        Self::with_rng(thread_rng(), controls)
    }
}

impl<R: Rng> Generator<R> {
    pub fn with_rng(rng: R, controls: Controls) -> Self {
        Self { rng, controls }
    }

    /// Draws a value uniformly from `[low, high]` rounded to `decimals`.
    fn rounded(&mut self, low: f64, high: f64, decimals: i32) -> f64 {
        let scale = 10f64.powi(decimals);
        (self.rng.gen_range(low..=high) * scale).round() / scale
    }

    pub fn next_record(&mut self) -> TelemetryRecord {
        let mut temperatures = [0.0; CELLS];
        for t in temperatures.iter_mut() {
            *t = self.rounded(20.0, 40.0, 1);
        }
        let mut voltages = [0.0; CELLS];
        for v in voltages.iter_mut() {
            *v = self.rounded(3.0, 4.2, 3);
        }

        TelemetryRecord {
            state_of_charge: Some(self.rounded(0.0, 100.0, 2)),
            battery_state: BatteryState::ALL.iter().choose(&mut self.rng).copied(),
            output_current: Some(self.rounded(0.0, 10.0, 2)),
            efuse_state: Some(self.rng.gen_range(0..=1)),
            balance_status: Some(if self.controls.balancing() {
                self.rng.gen_range(0..=5)
            } else {
                0
            }),
            error_detection: Some(if self.controls.error_detection() {
                self.rng.gen_range(0..=3)
            } else {
                0
            }),
            temperatures: Some(temperatures),
            voltages: Some(voltages),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::StdRng;

    fn generator(controls: Controls) -> Generator<StdRng> {
        Generator::with_rng(StdRng::seed_from_u64(7), controls)
    }

    #[test]
    fn records_are_complete_and_in_range() {
        let mut gen = generator(Controls::default());
        for _ in 0..500 {
            let r = gen.next_record();
            assert!(r.is_complete());

            let soc = r.state_of_charge.unwrap();
            assert!((0.0..=100.0).contains(&soc));
            assert!((0.0..=10.0).contains(&r.output_current.unwrap()));
            assert!(r.efuse_state.unwrap() <= 1);
            assert!(r.balance_status.unwrap() <= 5);
            assert!(r.error_detection.unwrap() <= 3);
            assert!(r.temperatures.unwrap().iter().all(|t| (20.0..=40.0).contains(t)));
            assert!(r.voltages.unwrap().iter().all(|v| (3.0..=4.2).contains(v)));

            // rounded to two decimals
            assert!(((soc * 100.0).round() - soc * 100.0).abs() < 1e-6);
        }
    }

    #[test]
    fn commands_force_codes_to_zero() {
        let controls = Controls::default();
        let mut gen = generator(controls.clone());

        controls.apply(Command::BalancingStop);
        controls.apply(Command::ErrorDetectionOff);
        for _ in 0..100 {
            let r = gen.next_record();
            assert_eq!(r.balance_status, Some(0));
            assert_eq!(r.error_detection, Some(0));
        }

        controls.apply(Command::BalancingStart);
        controls.apply(Command::ErrorDetectionOn);
        assert!(controls.balancing());
        assert!(controls.error_detection());
        assert!((0..200).any(|_| gen.next_record().balance_status != Some(0)));
    }
}
