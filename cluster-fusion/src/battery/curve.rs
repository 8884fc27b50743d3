//! LiPo voltage curve and pack cell-count classification
//!
//! The curve is a resting (open-circuit) per-cell voltage table. Lookups saturate
//! at both ends: anything at or above the top entry is 100%, anything at or below
//! the bottom entry is 0%. Between entries the value is linearly interpolated.

use crate::types::CellCount;

/// One `(volts_per_cell, percent)` entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageCurvePoint {
    pub cell_volts: f64,
    pub percent: f64,
}

const fn point(cell_volts: f64, percent: f64) -> VoltageCurvePoint {
    VoltageCurvePoint { cell_volts, percent }
}

/// Typical LiPo per-cell curve, strictly decreasing in voltage
pub const LIPO_CURVE: [VoltageCurvePoint; 11] = [
    point(4.20, 100.0),
    point(4.10, 90.0),
    point(4.00, 80.0),
    point(3.92, 70.0),
    point(3.85, 60.0),
    point(3.79, 50.0),
    point(3.74, 40.0),
    point(3.70, 30.0),
    point(3.66, 20.0),
    point(3.62, 10.0),
    point(3.50, 0.0),
];

/// Pack voltage below which a pack is classified as 2S
pub const THREE_CELL_MIN_VOLTS: f64 = 9.0;
/// Pack voltage below which a pack is classified as 3S
pub const FOUR_CELL_MIN_VOLTS: f64 = 12.0;

/// Map a per-cell voltage to a state-of-charge percent in [0, 100]
pub fn percent_from_cell_voltage(v_cell: f64) -> f64 {
    let top = LIPO_CURVE[0];
    let bottom = LIPO_CURVE[LIPO_CURVE.len() - 1];

    if v_cell >= top.cell_volts {
        return top.percent;
    }
    if v_cell <= bottom.cell_volts {
        return bottom.percent;
    }

    for pair in LIPO_CURVE.windows(2) {
        let (hi, lo) = (pair[0], pair[1]);
        if hi.cell_volts >= v_cell && v_cell >= lo.cell_volts {
            let t = (v_cell - lo.cell_volts) / (hi.cell_volts - lo.cell_volts);
            return lo.percent + t * (hi.percent - lo.percent);
        }
    }

    // NaN falls through every comparison above
    0.0
}

/// Guess the series cell count of a LiPo pack from its voltage
///
/// 2S spans ~6.0..8.4V, 3S ~9.0..12.6V, 4S ~12.0..16.8V. Non-positive readings
/// default to 2S. There is no hysteresis; pin the count in the battery config
/// if a pack sits near a threshold.
pub fn classify_cell_count(pack_voltage: f64) -> CellCount {
    if pack_voltage <= 0.0 || pack_voltage < THREE_CELL_MIN_VOLTS {
        CellCount::Two
    } else if pack_voltage < FOUR_CELL_MIN_VOLTS {
        CellCount::Three
    } else {
        CellCount::Four
    }
}

/// Stateless pack voltage to percent conversion
///
/// Uses `cells` when given, otherwise classifies from the voltage.
pub fn percent_for_pack(pack_voltage: f64, cells: Option<CellCount>) -> f64 {
    if pack_voltage <= 0.0 {
        return 0.0;
    }
    let cells = cells.unwrap_or_else(|| classify_cell_count(pack_voltage));
    let v_cell = pack_voltage / f64::from(cells.get());
    percent_from_cell_voltage(v_cell).clamp(0.0, 100.0)
}
