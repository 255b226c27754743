//! Tx FIR pre-emphasis design.
//!
//! This module derives the tap weights of the Tx pre-emphasis FIR filter from
//! the integer tap codes given as AMI parameters, checks the tap configuration,
//! and expands the symbol-spaced taps into a kernel at the sample rate of the
//! channel impulse response.

use crate::{
    model::TxModel,
    params::{resolve_int, ParameterSource},
};
use anyhow::{Context, Result};
use constants::{MAIN_TAP, MIN_HEADROOM, NUM_TAPS, SECONDARY_TAPS, TAP_SCALE, TAP_SIGNS};

pub mod constants;

/// Relative tolerance used to snap the samples per bit ratio to an integer.
const SAMPLES_PER_BIT_TOLERANCE: f64 = 1e-9;

/// Largest number of samples per unit interval accepted. This bounds the size
/// of the kernel and of the time-domain filter history.
const MAX_SAMPLES_PER_BIT: usize = 1 << 20;

/// Number of significant digits of the values in the derived parameter report.
const REPORT_DIGITS: i32 = 6;

/// Declaration of an integer AMI parameter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct IntParam {
    /// Parameter name.
    pub name: &'static str,
    /// Value used when the parameter is absent.
    pub default: i64,
    /// Minimum value declared in the AMI file.
    pub min: i64,
    /// Maximum value declared in the AMI file.
    pub max: i64,
}

impl IntParam {
    /// Resolves the parameter from a parameter source.
    pub fn resolve<S: ParameterSource + ?Sized>(&self, source: &S) -> i64 {
        let value = resolve_int(source, &[self.name], self.default);
        tracing::debug!(name = self.name, value, "resolved parameter");
        value
    }

    fn range_warning(&self, value: i64) -> Option<String> {
        if (self.min..=self.max).contains(&value) {
            None
        } else {
            Some(format!(
                "{} = {} is outside of its declared range [{}, {}]",
                self.name, value, self.min, self.max
            ))
        }
    }
}

/// Tap settings of the pre-emphasis filter.
///
/// The settings hold one integer code per tap position, in kernel order. The
/// code of the main tap is the residual of the tap unit budget, so the codes
/// always add up to the budget.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TapSettings {
    units: i64,
    codes: [i64; NUM_TAPS],
}

impl TapSettings {
    /// Creates tap settings from the tap unit budget and the secondary taps.
    ///
    /// The secondary tap codes are given in kernel order, skipping the main
    /// tap.
    ///
    /// The function fails if the main tap or the headroom of the
    /// configuration cannot be represented as an `i64`.
    pub fn new(units: i64, secondary: [i64; NUM_TAPS - 1]) -> Result<TapSettings> {
        let sum = secondary
            .iter()
            .try_fold(0i64, |sum, &code| sum.checked_add(code))
            .context("tap codes overflow")?;
        let main = units.checked_sub(sum).context("tap codes overflow")?;
        // headroom() must not overflow either
        sum.checked_mul(2)
            .and_then(|twice| units.checked_sub(twice))
            .context("tap codes overflow")?;
        let mut codes = [0; NUM_TAPS];
        for (&(position, _), &code) in SECONDARY_TAPS.iter().zip(secondary.iter()) {
            codes[position] = code;
        }
        codes[MAIN_TAP] = main;
        Ok(TapSettings { units, codes })
    }

    /// Resolves the tap settings from a parameter source.
    ///
    /// Parameters that are absent take their declared defaults.
    pub fn resolve<S: ParameterSource + ?Sized>(source: &S) -> Result<TapSettings> {
        let units = constants::TX_TAP_UNITS.resolve(source);
        let secondary = SECONDARY_TAPS.map(|(_, param)| param.resolve(source));
        TapSettings::new(units, secondary)
    }

    /// Returns the tap unit budget.
    pub fn units(&self) -> i64 {
        self.units
    }

    /// Returns the tap codes in kernel order.
    pub fn codes(&self) -> &[i64; NUM_TAPS] {
        &self.codes
    }

    /// Returns the code of the main tap.
    pub fn main_tap(&self) -> i64 {
        self.codes[MAIN_TAP]
    }

    /// Returns the sum of the secondary tap codes.
    pub fn secondary_sum(&self) -> i64 {
        self.units - self.main_tap()
    }

    /// Returns the headroom between the budget and twice the secondary taps.
    pub fn headroom(&self) -> i64 {
        self.units - 2 * self.secondary_sum()
    }

    /// Returns `true` if the headroom is enough for a sound equalizer.
    pub fn is_legal(&self) -> bool {
        self.headroom() >= MIN_HEADROOM
    }

    /// Returns the tap weights in volts, in kernel order.
    pub fn weights(&self) -> [f64; NUM_TAPS] {
        let mut weights = [0.0; NUM_TAPS];
        for ((w, &code), &sign) in weights.iter_mut().zip(self.codes.iter()).zip(TAP_SIGNS.iter()) {
            *w = code as f64 * TAP_SCALE * sign;
        }
        weights
    }

    /// Checks the tap configuration.
    ///
    /// Returns a list of human readable warnings. An empty list means that the
    /// configuration is legal. None of the warnings prevents the model from
    /// using the settings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.is_legal() {
            tracing::warn!(
                units = self.units,
                headroom = self.headroom(),
                "illegal Tx pre-emphasis tap configuration"
            );
            warnings.push("Illegal Tx pre-emphasis tap configuration!".to_string());
        }
        let ranged = std::iter::once((constants::TX_TAP_UNITS, self.units)).chain(
            SECONDARY_TAPS
                .iter()
                .map(|&(position, param)| (param, self.codes[position])),
        );
        for (param, value) in ranged {
            if let Some(warning) = param.range_warning(value) {
                tracing::warn!("{warning}");
                warnings.push(warning);
            }
        }
        warnings
    }

    /// Formats the derived parameter report.
    ///
    /// The report is a flat listing of the resolved parameters and computed
    /// weights, meant to be read by humans.
    pub fn report(&self, samples_per_bit: usize) -> String {
        let mut report = format!(
            "({} (tx_tap_units {}) (samples_per_bit {samples_per_bit})",
            constants::MODEL_NAME,
            self.units
        );
        for (n, code) in self.codes.iter().enumerate() {
            report.push_str(&format!(" (taps[{n}] {code})"));
        }
        for (n, &weight) in self.weights().iter().enumerate() {
            report.push_str(&format!(" (tap_weights[{n}] {})", format_significant(weight)));
        }
        report.push_str(")\n");
        report
    }
}

/// Computes the number of impulse response samples per unit interval.
///
/// This is `floor(bit_time / sample_interval)`, except that ratios within a
/// relative tolerance of an integer are taken to be that integer. The function
/// fails if the result is smaller than one.
pub fn samples_per_bit(bit_time: f64, sample_interval: f64) -> Result<usize> {
    if !(sample_interval.is_finite() && sample_interval > 0.0) {
        anyhow::bail!("sample interval {sample_interval} is not positive");
    }
    if !(bit_time.is_finite() && bit_time > 0.0) {
        anyhow::bail!("bit time {bit_time} is not positive");
    }
    let ratio = bit_time / sample_interval;
    let nearest = ratio.round();
    let ratio = if (ratio - nearest).abs() <= SAMPLES_PER_BIT_TOLERANCE * nearest {
        nearest
    } else {
        ratio.floor()
    };
    if ratio < 1.0 {
        anyhow::bail!(
            "bit time {bit_time} is shorter than the sample interval {sample_interval}"
        );
    }
    if ratio > MAX_SAMPLES_PER_BIT as f64 {
        anyhow::bail!("too many samples per bit ({ratio}), the maximum is {MAX_SAMPLES_PER_BIT}");
    }
    Ok(ratio as usize)
}

/// Expands symbol-spaced tap weights into a kernel at the channel sample rate.
///
/// Each weight is followed by `samples_per_bit - 1` zeros, so the returned
/// kernel has `weights.len() * samples_per_bit` entries and its nonzero
/// entries fall on unit interval boundaries.
pub fn expand_kernel(weights: &[f64], samples_per_bit: usize) -> Vec<f64> {
    let mut kernel = vec![0.0; weights.len() * samples_per_bit];
    for (tap, &weight) in kernel.chunks_exact_mut(samples_per_bit.max(1)).zip(weights) {
        tap[0] = weight;
    }
    kernel
}

// Rounds to REPORT_DIGITS significant digits, the default precision of a C++
// output stream, so that the report shows `0.407` rather than
// `0.40700000000000003`.
fn format_significant(x: f64) -> String {
    if x == 0.0 || !x.is_finite() {
        return format!("{x}");
    }
    let decimals = REPORT_DIGITS - 1 - x.abs().log10().floor() as i32;
    let scale = 10f64.powi(decimals);
    format!("{}", (x * scale).round() / scale)
}

/// Example Tx model.
///
/// A 4-tap FIR pre-emphasis filter with one post-cursor tap (`tx_tap_np1`) and
/// two pre-cursor taps (`tx_tap_nm1` and `tx_tap_nm2`). The tap codes are given in units of a fixed budget, set by
/// the `tx_tap_units` parameter.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct ExampleTx;

impl TxModel for ExampleTx {
    type Settings = TapSettings;

    fn name(&self) -> &str {
        constants::MODEL_NAME
    }

    fn resolve(&self, params: &dyn ParameterSource) -> Result<TapSettings> {
        TapSettings::resolve(params)
    }

    fn validate(&self, settings: &TapSettings) -> Vec<String> {
        settings.validate()
    }

    fn build_kernel(&self, settings: &TapSettings, samples_per_bit: usize) -> Vec<f64> {
        expand_kernel(&settings.weights(), samples_per_bit)
    }

    fn report(&self, settings: &TapSettings, samples_per_bit: usize) -> String {
        settings.report(samples_per_bit)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::ParamTree;

    fn nonzero_offsets(kernel: &[f64]) -> Vec<usize> {
        kernel
            .iter()
            .enumerate()
            .filter(|(_, &x)| x != 0.0)
            .map(|(n, _)| n)
            .collect()
    }

    #[test]
    fn main_tap_is_residual() {
        for units in [6, 20, 27, 40] {
            for secondary in [[0, 0, 0], [1, 2, 3], [10, 0, 5], [-2, 4, 0]] {
                let settings = TapSettings::new(units, secondary).unwrap();
                assert_eq!(settings.main_tap(), units - secondary.iter().sum::<i64>());
                assert_eq!(settings.codes().iter().sum::<i64>(), units);
            }
        }
    }

    #[test]
    fn codes_in_kernel_order() {
        let settings = TapSettings::new(27, [1, 2, 3]).unwrap();
        assert_eq!(settings.codes(), &[1, 21, 2, 3]);
    }

    #[test]
    fn defaults() {
        let tree = ParamTree::parse("(example_tx)").unwrap();
        let settings = TapSettings::resolve(&tree).unwrap();
        assert_eq!(settings.units(), 27);
        assert_eq!(settings.codes(), &[0, 27, 0, 0]);
    }

    #[test]
    fn resolve_from_tree() {
        let tree =
            ParamTree::parse("(example_tx (tx_tap_units 20) (tx_tap_np1 1) (tx_tap_nm2 2))")
                .unwrap();
        let settings = TapSettings::resolve(&tree).unwrap();
        assert_eq!(settings.units(), 20);
        assert_eq!(settings.codes(), &[1, 17, 0, 2]);
    }

    #[test]
    fn legal_configuration() {
        let settings = TapSettings::new(27, [0, 0, 0]).unwrap();
        assert_eq!(settings.main_tap(), 27);
        assert_eq!(settings.headroom(), 27);
        assert!(settings.is_legal());
        assert!(settings.validate().is_empty());
    }

    #[test]
    fn headroom_boundary() {
        // 27 - 2 * 10 = 7
        assert!(TapSettings::new(27, [5, 5, 0]).unwrap().is_legal());
        // 27 - 2 * 11 = 5
        let settings = TapSettings::new(27, [5, 5, 1]).unwrap();
        assert!(!settings.is_legal());
        assert_eq!(
            settings.validate(),
            vec!["Illegal Tx pre-emphasis tap configuration!".to_string()]
        );
        // 26 - 2 * 10 = 6
        assert!(TapSettings::new(26, [5, 5, 0]).unwrap().is_legal());
    }

    #[test]
    fn illegal_configuration_still_builds() {
        let settings = TapSettings::new(27, [10, 10, 10]).unwrap();
        assert_eq!(settings.main_tap(), -3);
        assert_eq!(settings.headroom(), -33);
        let warnings = settings.validate();
        assert_eq!(warnings[0], "Illegal Tx pre-emphasis tap configuration!");
        let kernel = ExampleTx.build_kernel(&settings, 1);
        assert_eq!(kernel.len(), 4);
        let expected = [
            10.0 * TAP_SCALE * -1.0,
            -3.0 * TAP_SCALE,
            10.0 * TAP_SCALE * -1.0,
            10.0 * TAP_SCALE * -1.0,
        ];
        assert_eq!(kernel, expected);
        assert_eq!(nonzero_offsets(&kernel), vec![0, 1, 2, 3]);
    }

    #[test]
    fn range_warnings() {
        let settings = TapSettings::new(30, [11, 0, -1]).unwrap();
        let warnings = settings.validate();
        assert!(warnings.iter().any(|w| w.starts_with("tx_tap_units = 30")));
        assert!(warnings.iter().any(|w| w.starts_with("tx_tap_np1 = 11")));
        assert!(warnings.iter().any(|w| w.starts_with("tx_tap_nm2 = -1")));
        assert!(!warnings.iter().any(|w| w.starts_with("tx_tap_nm1")));
    }

    #[test]
    fn weights() {
        let settings = TapSettings::new(27, [1, 2, 3]).unwrap();
        let w = settings.weights();
        assert_eq!(w[0], -TAP_SCALE);
        assert_eq!(w[1], 21.0 * TAP_SCALE);
        assert_eq!(w[2], -2.0 * TAP_SCALE);
        assert_eq!(w[3], -3.0 * TAP_SCALE);
    }

    #[test]
    fn samples_per_bit_values() {
        assert_eq!(samples_per_bit(8.0, 1.0).unwrap(), 8);
        assert_eq!(samples_per_bit(100e-12, 25e-12).unwrap(), 4);
        assert_eq!(samples_per_bit(1e-10, 1e-10 / 3.0).unwrap(), 3);
        assert_eq!(samples_per_bit(8.5, 1.0).unwrap(), 8);
        assert_eq!(samples_per_bit(1.0, 1.0).unwrap(), 1);
    }

    #[test]
    fn samples_per_bit_errors() {
        assert!(samples_per_bit(0.5, 1.0).is_err());
        assert!(samples_per_bit(1.0, 0.0).is_err());
        assert!(samples_per_bit(1.0, -1.0).is_err());
        assert!(samples_per_bit(0.0, 1.0).is_err());
        assert!(samples_per_bit(f64::NAN, 1.0).is_err());
        assert!(samples_per_bit(1.0, f64::INFINITY).is_err());
        assert!(samples_per_bit(1.0, 1e-12).is_err());
    }

    #[test]
    fn kernel_layout() {
        let settings = TapSettings::new(27, [1, 2, 3]).unwrap();
        let kernel = ExampleTx.build_kernel(&settings, 8);
        assert_eq!(kernel.len(), 32);
        assert_eq!(nonzero_offsets(&kernel), vec![0, 8, 16, 24]);
        let weights = settings.weights();
        for (n, &w) in weights.iter().enumerate() {
            assert_eq!(kernel[8 * n], w);
        }
    }

    #[test]
    fn kernel_length() {
        let settings = TapSettings::new(27, [0, 0, 0]).unwrap();
        for spb in 1..=16 {
            assert_eq!(ExampleTx.build_kernel(&settings, spb).len(), 4 * spb);
        }
    }

    #[test]
    fn expand() {
        assert_eq!(
            expand_kernel(&[0.5, -0.25, 0.125], 3),
            vec![0.5, 0.0, 0.0, -0.25, 0.0, 0.0, 0.125, 0.0, 0.0]
        );
        assert_eq!(expand_kernel(&[0.5, -0.25], 1), vec![0.5, -0.25]);
        assert!(expand_kernel(&[0.5, -0.25], 0).is_empty());
    }

    #[test]
    fn tap_code_overflow() {
        assert!(TapSettings::new(27, [i64::MAX, 1, 0]).is_err());
        assert!(TapSettings::new(i64::MIN, [1, 0, 0]).is_err());
        // the sum fits, but twice the sum does not
        assert!(TapSettings::new(0, [i64::MAX / 2 + 1, 0, 0]).is_err());
        let tree =
            ParamTree::parse("(example_tx (tx_tap_np1 9223372036854775807) (tx_tap_nm1 1))")
                .unwrap();
        assert!(TapSettings::resolve(&tree).is_err());
        let settings = TapSettings::new(27, [-1_000_000_000, 0, 0]).unwrap();
        assert_eq!(settings.main_tap(), 1_000_000_027);
        assert!(settings.is_legal());
    }

    #[test]
    fn report() {
        let settings = TapSettings::new(27, [0, 0, 0]).unwrap();
        assert_eq!(
            settings.report(4),
            "(example_tx (tx_tap_units 27) (samples_per_bit 4) (taps[0] 0) (taps[1] 27) \
             (taps[2] 0) (taps[3] 0) (tap_weights[0] -0) (tap_weights[1] 1.0989) \
             (tap_weights[2] -0) (tap_weights[3] -0))\n"
        );
        let settings = TapSettings::new(27, [10, 0, 0]).unwrap();
        assert!(settings.report(1).contains("(tap_weights[0] -0.407)"));
    }

    #[test]
    fn format_significant() {
        assert_eq!(super::format_significant(0.40700000000000003), "0.407");
        assert_eq!(super::format_significant(-0.1221), "-0.1221");
        assert_eq!(super::format_significant(-0.0), "-0");
        assert_eq!(super::format_significant(1.0989000000000002), "1.0989");
    }
}
