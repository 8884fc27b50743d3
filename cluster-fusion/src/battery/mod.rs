//! Battery state-of-charge estimation
//!
//! `curve` holds the stateless pieces (LiPo curve lookup, cell-count
//! classification); `estimator` adds sag compensation and smoothing on top.

pub mod curve;
pub mod estimator;

pub use curve::{
    classify_cell_count, percent_for_pack, percent_from_cell_voltage, VoltageCurvePoint,
    LIPO_CURVE,
};
pub use estimator::BatteryEstimator;
