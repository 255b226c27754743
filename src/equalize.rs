//! Impulse response equalization.
//!
//! This module applies the Tx FIR kernel to the channel impulse responses
//! handed over by the host at initialization, and to waveform blocks in
//! time-domain simulation.

use anyhow::Result;

/// Impulse response matrix.
///
/// This is a view of a buffer owned by the host. The matrix has one column per
/// channel, victim first and then each aggressor. Each column holds `rows`
/// consecutive time samples.
#[derive(Debug)]
pub struct ImpulseMatrix<'a> {
    data: &'a mut [f64],
    rows: usize,
}

impl<'a> ImpulseMatrix<'a> {
    /// Creates a matrix view of `data`.
    ///
    /// The function returns an error if the length of `data` does not match
    /// `rows` times `aggressors + 1`.
    pub fn new(data: &'a mut [f64], rows: usize, aggressors: usize) -> Result<ImpulseMatrix<'a>> {
        let columns = aggressors
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("too many aggressors"))?;
        let Some(len) = rows.checked_mul(columns) else {
            anyhow::bail!("impulse matrix with {rows} rows and {columns} columns is too large");
        };
        if data.len() != len {
            anyhow::bail!(
                "impulse matrix buffer has {} samples, but {rows} rows and {columns} columns need {len}",
                data.len()
            );
        }
        Ok(ImpulseMatrix { data, rows })
    }

    /// Returns the number of time samples in each column.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the number of columns (victim plus aggressors).
    pub fn columns(&self) -> usize {
        if self.rows == 0 {
            0
        } else {
            self.data.len() / self.rows
        }
    }

    fn columns_mut(&mut self) -> std::slice::ChunksMut<'_, f64> {
        self.data.chunks_mut(self.rows.max(1))
    }
}

/// Applies a FIR kernel to every column of an impulse response matrix.
///
/// Each column is replaced by its linear convolution with `kernel`, truncated
/// to the original number of rows.
pub fn apply_kernel(matrix: &mut ImpulseMatrix<'_>, kernel: &[f64]) {
    let taps = nonzero_taps(kernel);
    for column in matrix.columns_mut() {
        // going backwards, the samples still needed have not been overwritten
        for n in (0..column.len()).rev() {
            let y: f64 = taps
                .iter()
                .filter(|&&(delay, _)| delay <= n)
                .map(|&(delay, h)| h * column[n - delay])
                .sum();
            column[n] = y;
        }
    }
}

// nonzero kernel entries as (delay, coefficient)
fn nonzero_taps(kernel: &[f64]) -> Vec<(usize, f64)> {
    kernel
        .iter()
        .enumerate()
        .filter(|(_, &h)| h != 0.0)
        .map(|(delay, &h)| (delay, h))
        .collect()
}

/// Computes the step response corresponding to an impulse response.
///
/// This is the running sum of the impulse response.
pub fn step_response(impulse: &[f64]) -> Vec<f64> {
    impulse
        .iter()
        .scan(0.0, |acc, &x| {
            *acc += x;
            Some(*acc)
        })
        .collect()
}

/// Computes the pulse response corresponding to a step response.
///
/// The pulse response is the response to a pulse one unit interval long, which
/// is the step response minus the same step response delayed by
/// `samples_per_bit` samples.
pub fn pulse_response(step: &[f64], samples_per_bit: usize) -> Vec<f64> {
    step.iter()
        .enumerate()
        .map(|(n, &x)| match n.checked_sub(samples_per_bit) {
            Some(m) => x - step[m],
            None => x,
        })
        .collect()
}

/// Streaming FIR filter.
///
/// The filter keeps the input history between calls to
/// [`process`](StreamingFir::process), so filtering a waveform block by block
/// gives the same result as filtering it in one go.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingFir {
    // nonzero taps as (delay, coefficient)
    taps: Vec<(usize, f64)>,
    history: Vec<f64>,
    write_idx: usize,
}

impl StreamingFir {
    /// Creates a filter with the given kernel and an all-zeros history.
    pub fn new(kernel: &[f64]) -> StreamingFir {
        StreamingFir {
            taps: nonzero_taps(kernel),
            history: vec![0.0; kernel.len().max(1)],
            write_idx: 0,
        }
    }

    /// Filters a block of samples in place.
    pub fn process(&mut self, block: &mut [f64]) {
        let len = self.history.len();
        for x in block.iter_mut() {
            self.history[self.write_idx] = *x;
            *x = self
                .taps
                .iter()
                .map(|&(delay, h)| h * self.history[(self.write_idx + len - delay) % len])
                .sum();
            self.write_idx = (self.write_idx + 1) % len;
        }
    }
}
