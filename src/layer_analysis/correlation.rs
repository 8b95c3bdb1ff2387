//! Pairwise frame similarity: the squared normalized correlation (r²) of the
//! pixel intensities of two frames.

use crate::Frame;

/// Per-frame moments that are reused for every pair a frame takes part in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameMoments {
    n: u64,
    sum: u64,
    sum_sq: u64,
}

impl FrameMoments {
    pub fn of(frame: &Frame) -> Self {
        let (sum, sum_sq) = frame
            .pixels()
            .iter()
            .map(|&p| p as u64)
            .fold((0, 0), |(s, sq), p| (s + p, sq + p * p));
        Self {
            n: frame.pixels().len() as u64,
            sum,
            sum_sq,
        }
    }

    /// `N·Σx² − (Σx)²`, i.e., `N²` times the variance. Zero for flat frames.
    fn spread(&self) -> i128 {
        self.n as i128 * self.sum_sq as i128 - (self.sum as i128).pow(2)
    }
}

/// Returns r² of two frames of equal size, a value in `[0, 1]`.
///
/// Two flat frames with the same intensity match perfectly (`1.0`); a flat
/// frame has no correlation with a textured one (`0.0`). The result is
/// exactly symmetric in its arguments.
pub fn r_squared(a: &Frame, moments_a: &FrameMoments, b: &Frame, moments_b: &FrameMoments) -> f64 {
    assert_eq!(a.size(), b.size(), "frames must be normalized to one size");

    let spread_a = moments_a.spread();
    let spread_b = moments_b.spread();
    if spread_a == 0 || spread_b == 0 {
        let same = spread_a == spread_b && moments_a.sum == moments_b.sum;
        return if same { 1.0 } else { 0.0 };
    }

    let sum_xy = a
        .pixels()
        .iter()
        .zip(b.pixels())
        .map(|(&x, &y)| x as u64 * y as u64)
        .sum::<u64>();
    let covariance =
        moments_a.n as i128 * sum_xy as i128 - moments_a.sum as i128 * moments_b.sum as i128;

    let numerator = (covariance as f64) * (covariance as f64);
    let denominator = spread_a as f64 * spread_b as f64;
    (numerator / denominator).min(1.0)
}
