//! Causal Savitzky-Golay smoothing with a fixed polynomial order.
//!
//! For every sample, a polynomial is fitted by least squares to the most
//! recent `window` samples and evaluated at the newest one. The fit reduces
//! to a fixed weighted sum, so the weights are computed once upfront.

use ringbuffer::{AllocRingBuffer, RingBuffer};

/// Degree of the fitted polynomial.
pub const SAVGOL_ORDER: usize = 4;

const TERMS: usize = SAVGOL_ORDER + 1;

/// Sliding Savitzky-Golay filter.
#[derive(Debug)]
pub struct SavitzkyGolay {
    /// Weight per window position, oldest first. Empty if disabled.
    weights: Vec<f64>,
    history: Option<AllocRingBuffer<f64>>,
}

impl SavitzkyGolay {
    /// Creates a filter over the last `window` samples. A window that is too
    /// small for a polynomial of [`SAVGOL_ORDER`] disables the filter, so all
    /// samples pass unchanged.
    pub fn new(window: usize) -> Self {
        if window <= SAVGOL_ORDER {
            log::debug!("Savitzky-Golay window {window} too small, filter disabled");
            return Self {
                weights: Vec::new(),
                history: None,
            };
        }
        Self {
            weights: causal_weights(window),
            history: Some(AllocRingBuffer::new(window)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.history.is_some()
    }

    /// Consumes the next sample and returns the smoothed value. Until the
    /// window is filled, samples are returned unchanged.
    pub fn update(&mut self, sample: f64) -> f64 {
        let Some(history) = self.history.as_mut() else {
            return sample;
        };
        history.push(sample);
        if !history.is_full() {
            return sample;
        }
        history
            .iter()
            .zip(&self.weights)
            .map(|(y, w)| y * w)
            .sum()
    }

    /// Smooths a whole signal with a fresh filter.
    pub fn apply(window: usize, signal: &[f64]) -> Vec<f64> {
        let mut filter = Self::new(window);
        signal.iter().map(|&s| filter.update(s)).collect()
    }
}

/// Computes the weights `c` with `fit(newest) = Σ c[t]·y[t]`.
///
/// With the design matrix `A[t][p] = u_t^p`, where `u_t` is the scaled
/// distance of position `t` to the newest sample, the fitted value at
/// `u = 0` is the constant coefficient: `c = A·(AᵀA)⁻¹·e₀`.
fn causal_weights(window: usize) -> Vec<f64> {
    let scale = (window - 1) as f64;
    let design = (0..window)
        .map(|t| {
            let u = (t as f64 - scale) / scale;
            let mut row = [1.0; TERMS];
            for p in 1..TERMS {
                row[p] = row[p - 1] * u;
            }
            row
        })
        .collect::<Vec<_>>();

    let mut normal = [[0.0; TERMS]; TERMS];
    for row in &design {
        for i in 0..TERMS {
            for j in 0..TERMS {
                normal[i][j] += row[i] * row[j];
            }
        }
    }
    let mut e0 = [0.0; TERMS];
    e0[0] = 1.0;
    let z = solve(normal, e0);

    design
        .iter()
        .map(|row| row.iter().zip(&z).map(|(a, z)| a * z).sum())
        .collect()
}

/// Solves `m·x = b` with Gaussian elimination and partial pivoting.
///
/// The normal matrix of distinct sample positions is positive definite, so a
/// pivot of zero is a bug.
fn solve(mut m: [[f64; TERMS]; TERMS], mut b: [f64; TERMS]) -> [f64; TERMS] {
    for col in 0..TERMS {
        let pivot = (col..TERMS)
            .max_by(|&a, &c| m[a][col].abs().total_cmp(&m[c][col].abs()))
            .expect("range is not empty");
        assert!(m[pivot][col] != 0.0, "singular normal matrix");
        m.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..TERMS {
            let factor = m[row][col] / m[col][col];
            for k in col..TERMS {
                m[row][k] -= factor * m[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; TERMS];
    for row in (0..TERMS).rev() {
        let tail = (row + 1..TERMS).map(|k| m[row][k] * x[k]).sum::<f64>();
        x[row] = (b[row] - tail) / m[row][row];
    }
    x
}
