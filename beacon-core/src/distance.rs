//! Distance estimation from reference power and measured RSSI.
//!
//! Empirical path-loss fit. Both branches and their constants feed the
//! proximity ordering, so they must stay exactly as they are.

/// Returned when the signal sample carries no information.
pub const UNKNOWN_DISTANCE: f64 = -1.0;

const FIT_COEFFICIENT: f64 = 0.89976;
const FIT_EXPONENT: f64 = 7.7095;
const FIT_INTERCEPT: f64 = 0.111;

/// Estimate distance in meters.
///
/// `reference_power` is the calibrated RSSI at 1 m; `measured_signal` the
/// sample just received. A zero sample yields [`UNKNOWN_DISTANCE`].
pub fn estimate(reference_power: i8, measured_signal: f64) -> f64 {
    if measured_signal == 0.0 {
        return UNKNOWN_DISTANCE;
    }

    let ratio = measured_signal / f64::from(reference_power);
    if ratio < 1.0 {
        ratio.powi(10)
    } else {
        FIT_COEFFICIENT * ratio.powf(FIT_EXPONENT) + FIT_INTERCEPT
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
