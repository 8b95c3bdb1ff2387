/*
MIT License

Copyright (c) 2024 Philipp Schuster

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

//! Module for [`SimilarityMatrix`], the symmetric N×N matrix of pairwise
//! frame scores, and its projections to one value per frame.

use super::correlation::{r_squared, FrameMoments};
use crate::Frame;
use thiserror::Error;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Self-score offset of the diagonal. Keeps the diagonal strictly above any
/// pairwise score.
pub const DEFAULT_SELF_SCORE_EPSILON: f64 = 1e-10;

/// Possible errors when building a matrix from raw rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixShapeError {
    #[error("row {row} has {len} entries but the matrix has {side} rows")]
    NotSquare { row: usize, len: usize, side: usize },
}

/// Square matrix of `f64`, stored row-major.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimilarityMatrix {
    side: usize,
    data: Vec<f64>,
}

impl SimilarityMatrix {
    /// Computes the pairwise r² matrix of `frames`, which must all have the
    /// same size. The diagonal holds `1.0 + self_score_epsilon`.
    ///
    /// Only the upper triangle is computed; the lower triangle is mirrored,
    /// so the result is exactly symmetric.
    pub fn compute(frames: &[&Frame], self_score_epsilon: f64) -> Self {
        let side = frames.len();
        let moments = frames.iter().map(|f| FrameMoments::of(f)).collect::<Vec<_>>();
        let mut data = vec![0.0; side * side];

        let fill_row = |(i, row): (usize, &mut [f64])| {
            row[i] = 1.0 + self_score_epsilon;
            for j in i + 1..side {
                row[j] = r_squared(frames[i], &moments[i], frames[j], &moments[j]);
            }
        };

        if side > 0 {
            #[cfg(feature = "parallel")]
            data.par_chunks_mut(side).enumerate().for_each(fill_row);
            #[cfg(not(feature = "parallel"))]
            data.chunks_mut(side).enumerate().for_each(fill_row);
        }

        for i in 1..side {
            for j in 0..i {
                data[i * side + j] = data[j * side + i];
            }
        }

        Self { side, data }
    }

    /// Builds a matrix from rows, e.g., from a persisted result.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, MatrixShapeError> {
        let side = rows.len();
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != side) {
            return Err(MatrixShapeError::NotSquare {
                row,
                len: r.len(),
                side,
            });
        }
        Ok(Self {
            side,
            data: rows.concat(),
        })
    }

    /// Number of rows, which equals the number of columns.
    #[must_use]
    pub const fn side(&self) -> usize {
        self.side
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.side == 0
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        assert!(row < self.side && col < self.side);
        self.data[row * self.side + col]
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        assert!(row < self.side);
        &self.data[row * self.side..(row + 1) * self.side]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks() panics on a chunk size of zero.
        self.data.chunks(self.side.max(1))
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows().map(<[f64]>::to_vec).collect()
    }

    pub fn is_symmetric(&self) -> bool {
        (0..self.side).all(|i| (0..i).all(|j| self.get(i, j) == self.get(j, i)))
    }

    /// Normalized Shannon entropy of each row, reported as `1 − entropy`.
    ///
    /// Each row is turned into a distribution by dividing by its sum. Frames
    /// that are similar to many others spread their mass evenly and get a
    /// value close to zero.
    pub fn entropy_signal(&self) -> Vec<f64> {
        if self.side == 1 {
            return vec![1.0];
        }
        let max_entropy = libm::log2(self.side as f64);
        self.rows()
            .map(|row| {
                let sum = row.iter().sum::<f64>();
                let entropy = if sum > 0.0 {
                    row.iter()
                        .map(|&v| v / sum)
                        .filter(|&p| p > 0.0)
                        .map(|p| -p * libm::log2(p))
                        .sum::<f64>()
                } else {
                    0.0
                };
                1.0 - entropy / max_entropy
            })
            .collect()
    }

    /// Mean of each row.
    pub fn mean_projection(&self) -> Vec<f64> {
        self.rows()
            .map(|row| row.iter().sum::<f64>() / self.side as f64)
            .collect()
    }
}
