//! Waveform files.
//!
//! Channel impulse responses are often exported by circuit simulators as text
//! files with one time-voltage pair per line. This module loads such files and
//! resamples them to the sample interval used by the model.

use anyhow::{Context, Result};
use std::path::Path;

/// Waveform given as voltage samples at arbitrary time instants.
#[derive(Debug, Clone, PartialEq)]
pub struct Wave {
    time: Vec<f64>,
    voltage: Vec<f64>,
}

impl Wave {
    /// Parses a waveform file.
    ///
    /// The first line is a header and is discarded. Each of the remaining
    /// non-empty lines must contain a time and a voltage separated by
    /// whitespace. Times and voltages must be finite, and time must be strictly
    /// increasing.
    pub fn parse(text: &str) -> Result<Wave> {
        let mut time = Vec::new();
        let mut voltage = Vec::new();
        for (n, line) in text.lines().enumerate().skip(1) {
            let mut fields = line.split_whitespace();
            let Some(t) = fields.next() else {
                continue;
            };
            let v = fields
                .next()
                .with_context(|| format!("line {}: missing voltage", n + 1))?;
            let t: f64 = t
                .parse()
                .with_context(|| format!("line {}: invalid time {t:?}", n + 1))?;
            let v: f64 = v
                .parse()
                .with_context(|| format!("line {}: invalid voltage {v:?}", n + 1))?;
            if !t.is_finite() {
                anyhow::bail!("line {}: time {t} is not finite", n + 1);
            }
            if !v.is_finite() {
                anyhow::bail!("line {}: voltage {v} is not finite", n + 1);
            }
            if let Some(&last) = time.last() {
                if t <= last {
                    anyhow::bail!("line {}: time {t} does not increase", n + 1);
                }
            }
            time.push(t);
            voltage.push(v);
        }
        Ok(Wave { time, voltage })
    }

    /// Loads a waveform file.
    pub fn load(path: &Path) -> Result<Wave> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Wave::parse(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Resamples the waveform with linear interpolation.
    ///
    /// The first output sample corresponds to the first time instant of the
    /// waveform. Output samples are produced for every multiple of
    /// `sample_interval` strictly before the last time instant.
    pub fn resample(&self, sample_interval: f64) -> Result<Vec<f64>> {
        if !(sample_interval.is_finite() && sample_interval > 0.0) {
            anyhow::bail!("sample interval {sample_interval} is not positive");
        }
        if self.time.len() < 2 {
            anyhow::bail!("waveform needs at least 2 samples to be resampled");
        }
        let t0 = self.time[0];
        let duration = self.time[self.time.len() - 1] - t0;
        let mut out = Vec::new();
        let mut i = 1;
        for n in 0u64.. {
            let t = n as f64 * sample_interval;
            if t >= duration {
                break;
            }
            while self.time[i] - t0 <= t {
                i += 1;
            }
            let (ta, tb) = (self.time[i - 1] - t0, self.time[i] - t0);
            let (va, vb) = (self.voltage[i - 1], self.voltage[i]);
            out.push(va + (vb - va) * (t - ta) / (tb - ta));
        }
        Ok(out)
    }
}

/// Returns an ideal impulse response of `len` samples.
///
/// The impulse is placed in the second sample.
pub fn ideal_impulse(len: usize) -> Vec<f64> {
    let mut response = vec![0.0; len];
    if let Some(x) = response.get_mut(1) {
        *x = 1.0;
    }
    response
}
