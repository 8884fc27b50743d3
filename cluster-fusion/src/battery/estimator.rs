//! Display-oriented battery percent estimator
//!
//! Produces a stable percent from noisy pack readings using:
//! 1. Optional sag compensation (`v + I*R`) so acceleration dips are not read as
//!    charge loss
//! 2. The LiPo voltage curve
//! 3. EMA smoothing, with a per-tick cap on upward movement
//!
//! This is voltage based; it does not integrate current over time.

use super::curve::{classify_cell_count, percent_from_cell_voltage};
use crate::config::BatteryConfig;

/// Smoothed battery percent estimator
///
/// Holds the filtered percent across ticks. Non-positive voltages are treated as
/// "no sensor" and leave the filter untouched.
#[derive(Debug, Clone)]
pub struct BatteryEstimator {
    config: BatteryConfig,
    filtered_percent: Option<f64>,
}

impl BatteryEstimator {
    pub fn new(config: BatteryConfig) -> Self {
        Self {
            config,
            filtered_percent: None,
        }
    }

    pub fn config(&self) -> &BatteryConfig {
        &self.config
    }

    /// Last filtered value, `None` until the first valid sample
    pub fn filtered_percent(&self) -> Option<f64> {
        self.filtered_percent
    }

    /// Forget the smoothing history (e.g. after a pack swap)
    pub fn reset(&mut self) {
        self.filtered_percent = None;
    }

    /// Resting-voltage estimate for a loaded reading
    pub fn effective_voltage(&self, pack_voltage: f64, current_ma: f64) -> f64 {
        let current_a = current_ma / 1000.0;
        if self.config.enable_sag_compensation && current_a > 0.0 {
            pack_voltage + current_a * self.config.internal_resistance_ohm
        } else {
            pack_voltage
        }
    }

    /// Unfiltered percent for a reading (after sag compensation)
    pub fn raw_percent(&self, pack_voltage: f64, current_ma: f64) -> f64 {
        if pack_voltage <= 0.0 {
            return 0.0;
        }
        let v_eff = self.effective_voltage(pack_voltage, current_ma);
        let cells = self
            .config
            .forced_cell_count
            .unwrap_or_else(|| classify_cell_count(v_eff));
        percent_from_cell_voltage(v_eff / f64::from(cells.get())).clamp(0.0, 100.0)
    }

    /// Feed one reading and return the filtered percent in [0, 100]
    ///
    /// `current_ma` is positive while discharging.
    pub fn update(&mut self, pack_voltage: f64, current_ma: f64) -> f64 {
        if pack_voltage <= 0.0 {
            return 0.0;
        }

        let p_raw = self.raw_percent(pack_voltage, current_ma);

        let filtered = match self.filtered_percent {
            None => p_raw,
            Some(prev) => {
                let ema = self.config.alpha * p_raw + (1.0 - self.config.alpha) * prev;
                // Recovery after a sag release ramps at a fixed rate from the
                // previous value; depletion follows the EMA.
                if p_raw > ema {
                    (prev + self.config.rise_limit_per_tick).min(p_raw)
                } else {
                    ema
                }
            }
        };

        let filtered = filtered.clamp(0.0, 100.0);
        self.filtered_percent = Some(filtered);

        log::trace!(
            "battery: v={:.3} i={:.1}mA raw={:.2}% filtered={:.2}%",
            pack_voltage,
            current_ma,
            p_raw,
            filtered
        );

        filtered
    }
}

impl Default for BatteryEstimator {
    fn default() -> Self {
        Self::new(BatteryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellCount;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// Estimator whose filter has been seeded to `percent` on a 2S pack
    fn seeded_at(percent: f64) -> BatteryEstimator {
        let mut estimator = BatteryEstimator::default();
        estimator.filtered_percent = Some(percent);
        estimator
    }

    #[test]
    fn test_end_to_end_reference_reading() {
        let mut estimator = BatteryEstimator::default();
        assert!(approx(estimator.effective_voltage(8.0, 200.0), 8.02));
        let percent = estimator.update(8.0, 200.0);
        assert!(approx(percent, 81.0));
        assert!(approx(estimator.filtered_percent().unwrap(), 81.0));
    }

    #[test]
    fn test_zero_voltage_does_not_touch_filter() {
        let mut estimator = BatteryEstimator::default();
        assert_eq!(estimator.update(0.0, 100.0), 0.0);
        assert_eq!(estimator.filtered_percent(), None);

        let first = estimator.update(8.0, 0.0);
        assert_eq!(estimator.update(-2.0, 0.0), 0.0);
        assert_eq!(estimator.filtered_percent(), Some(first));

        // Same as an estimator that never saw the bad readings
        let mut clean = BatteryEstimator::default();
        clean.update(8.0, 0.0);
        assert_eq!(estimator.update(7.9, 0.0), clean.update(7.9, 0.0));
    }

    #[test]
    fn test_rise_is_limited_per_tick() {
        // 2S at 8.2V -> 4.10 V/cell -> 90%
        let mut estimator = seeded_at(50.0);
        let next = estimator.update(8.2, 0.0);
        assert!(next <= 50.8 + 1e-9, "rose too fast: {next}");
        assert!(approx(next, 50.8));

        let mut prev = next;
        for _ in 0..100 {
            let value = estimator.update(8.2, 0.0);
            assert!(value - prev <= 0.8 + 1e-9);
            assert!(value >= prev);
            prev = value;
        }
        assert!(approx(prev, 90.0));

        // Once converged it tracks the raw value exactly
        assert!(approx(estimator.update(8.2, 0.0), 90.0));
    }

    #[test]
    fn test_fall_follows_ema() {
        // 2S at 7.84V -> 3.92 V/cell -> 70%
        let mut estimator = seeded_at(90.0);
        let next = estimator.update(7.84, 0.0);
        assert!(approx(next, 0.12 * 70.0 + 0.88 * 90.0));
    }

    #[test]
    fn test_sag_compensation_raises_percent() {
        let compensated = BatteryEstimator::default();
        let plain = BatteryEstimator::new(BatteryConfig {
            enable_sag_compensation: false,
            ..BatteryConfig::default()
        });

        let idle = compensated.raw_percent(7.9, 0.0);
        let mut prev = idle;
        for current in [100.0, 500.0, 1000.0, 2000.0] {
            let loaded = compensated.raw_percent(7.9, current);
            assert!(loaded > prev);
            assert_eq!(plain.raw_percent(7.9, current), idle);
            prev = loaded;
        }

        // Pinned at the top of the curve it can only hold
        assert_eq!(compensated.raw_percent(8.5, 2000.0), 100.0);
        assert_eq!(plain.raw_percent(8.5, 0.0), 100.0);
    }

    #[test]
    fn test_charging_current_is_not_compensated() {
        let estimator = BatteryEstimator::default();
        assert_eq!(estimator.effective_voltage(8.0, -500.0), 8.0);
        assert_eq!(estimator.effective_voltage(8.0, 0.0), 8.0);
    }

    #[test]
    fn test_forced_cell_count() {
        let mut estimator = BatteryEstimator::new(BatteryConfig {
            forced_cell_count: Some(CellCount::Three),
            enable_sag_compensation: false,
            ..BatteryConfig::default()
        });
        // 8.0V would auto-classify as 2S (4.00 V/cell, 80%); as 3S it is empty
        assert_eq!(estimator.update(8.0, 0.0), 0.0);
        assert!(approx(estimator.raw_percent(12.3, 0.0), 90.0));
    }

    #[test]
    fn test_reset() {
        let mut estimator = BatteryEstimator::default();
        estimator.update(8.0, 0.0);
        estimator.reset();
        assert_eq!(estimator.filtered_percent(), None);
        assert!(approx(estimator.update(8.2, 0.0), 90.0));
    }
}
