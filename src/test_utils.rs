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

use crate::Frame;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

/// Width and height of synthetic frames.
pub const FRAME_SIDE: usize = 32;

const BACKGROUND: u8 = 40;
const CELL: u8 = 200;
const RELAXED_RADIUS: f64 = 10.0;
const CONTRACTED_RADIUS: f64 = 5.0;
/// Number of frames from the onset to the peak of a contraction.
const CONTRACTION_HALF_WIDTH: f64 = 4.0;

/// Returns the frame indices where the synthetic cell is fully contracted.
pub fn contraction_peaks(count: usize, period: usize) -> Vec<usize> {
    (0..count).filter(|k| k % period == period / 2).collect()
}

/// Radius of the synthetic cell in frame `k`.
fn radius(k: usize, period: usize) -> f64 {
    let center = (period / 2) as f64;
    let distance = ((k % period) as f64 - center).abs();
    let bump = (1.0 - distance / CONTRACTION_HALF_WIDTH).max(0.0);
    RELAXED_RADIUS - (RELAXED_RADIUS - CONTRACTED_RADIUS) * bump
}

/// Creates `count` frames of a bright disc ("cell") on a dark background
/// that contracts once per `period` frames, see [`contraction_peaks`].
/// Every pixel gets a bit of seeded noise.
pub fn beating_disc_frames(count: usize, period: usize, seed: u64) -> Vec<Frame> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mid = (FRAME_SIDE as f64 - 1.0) / 2.0;
    (0..count)
        .map(|k| {
            let r = radius(k, period);
            let pixels = (0..FRAME_SIDE)
                .cartesian_product(0..FRAME_SIDE)
                .map(|(y, x)| {
                    let inside = (x as f64 - mid).hypot(y as f64 - mid) <= r;
                    let base = if inside { CELL } else { BACKGROUND };
                    base + rng.random_range(0..8)
                })
                .collect::<Vec<_>>();
            Frame::new(FRAME_SIDE, FRAME_SIDE, pixels).unwrap()
        })
        .collect()
}

/// Returns the cargo target dir.
pub fn target_dir() -> PathBuf {
    // 1. Check if CARGO_TARGET_DIR is set
    if let Ok(dir) = std::env::var("CARGO_TARGET_DIR") {
        PathBuf::from(dir)
    } else {
        // 2. Fall back to default: go up from CARGO_MANIFEST_DIR
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.join("target")
    }
}

/// Returns a directory within the cargo target dir to store test artifacts.
pub fn target_dir_test_artifacts() -> PathBuf {
    let mut path = target_dir();
    path.push("test_generated");
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn synthetic_frames_are_reproducible() {
        let a = beating_disc_frames(6, 6, 1);
        let b = beating_disc_frames(6, 6, 1);
        check!(a == b);
        check!(a.len() == 6);
        check!(contraction_peaks(20, 8) == [4, 12]);
    }

    #[test]
    fn cell_shrinks_towards_the_peak() {
        check!(radius(0, 16) == RELAXED_RADIUS);
        check!(radius(8, 16) == CONTRACTED_RADIUS);
        check!(radius(7, 16) < RELAXED_RADIUS);
        check!(radius(7, 16) == radius(9, 16));
    }
}
