//! Example Tx model constants.
//!
//! This module contains the constants that define the FIR pre-emphasis filter
//! of the example Tx model and the declarations of its AMI parameters.

use super::IntParam;

/// Model name, used as the root of the derived parameter report.
pub const MODEL_NAME: &str = "example_tx";

/// Number of FIR tap positions.
pub const NUM_TAPS: usize = 4;

/// Position of the main tap in kernel order.
///
/// The main tap code is not a parameter. It takes whatever remains of the tap
/// unit budget after the secondary taps.
pub const MAIN_TAP: usize = 1;

/// Voltage contributed by each tap unit.
pub const TAP_SCALE: f64 = 0.0407;

/// Polarity of each tap position, in kernel order.
pub const TAP_SIGNS: [f64; NUM_TAPS] = [-1.0, 1.0, -1.0, -1.0];

/// Minimum value of `tx_tap_units - 2 * (sum of secondary taps)` for a legal
/// pre-emphasis configuration.
pub const MIN_HEADROOM: i64 = 6;

/// Total number of tap units available to the FIR filter.
pub const TX_TAP_UNITS: IntParam = IntParam {
    name: "tx_tap_units",
    default: 27,
    min: 6,
    max: 27,
};

/// Secondary taps, paired with their position in kernel order.
pub const SECONDARY_TAPS: [(usize, IntParam); NUM_TAPS - 1] = [
    (
        0,
        IntParam {
            name: "tx_tap_np1",
            default: 0,
            min: 0,
            max: 10,
        },
    ),
    (
        2,
        IntParam {
            name: "tx_tap_nm1",
            default: 0,
            min: 0,
            max: 10,
        },
    ),
    (
        3,
        IntParam {
            name: "tx_tap_nm2",
            default: 0,
            min: 0,
            max: 10,
        },
    ),
];
