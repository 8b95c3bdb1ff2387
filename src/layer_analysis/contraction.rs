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

//! Module for [`ContractionAnalyzer`].
//!
//! The analyzer takes the per-frame signal and the similarity matrix of a
//! [`SimilarityProducer`] and locates the dominant contraction:
//!
//! 1. Frames are ranked by the distance of their signal value to the median
//!    signal value (see [`median_levelsets`]). Low ranks are "typical" frames.
//! 2. The `K` most typical frames act as reference. Each frame's filtered
//!    value is its mean similarity to these references. Atypical frames thus
//!    never influence the estimate.
//! 3. The minimum of the filtered signal is the contraction peak. An
//!    [`EnvelopeWindow`] around it yields the start and the end of the
//!    contraction.
//!
//! [`SimilarityProducer`]: super::producer::SimilarityProducer

use super::median_levelset::median_levelsets;
use super::savgol::SavitzkyGolay;
use super::similarity::SimilarityMatrix;
use crate::events::{SubscriptionId, Subscribers};
use crate::layer_input_processing::f64::{InvalidF64Error, LevelsetFraction};
use thiserror::Error;

/// A frame index and the signal value at that frame.
pub type IndexValue = (usize, f64);

/// Possible errors of the [`ContractionAnalyzer`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyzerError {
    #[error("no input loaded or the input is empty")]
    EmptyInput,
    #[error("signal has {signal} values but the matrix has {matrix} rows")]
    SizeMismatch { signal: usize, matrix: usize },
    #[error("{what} contains a non-finite value at {index}")]
    NonFiniteInput { what: &'static str, index: usize },
    #[error("levelset selects {count} of {frames} frames, but must select fewer than all")]
    LevelsetTooLarge { count: usize, frames: usize },
    #[error("invalid levelset percentage")]
    InvalidLevelset(#[from] InvalidF64Error),
}

/// Frames before and after the peak that make up a contraction.
///
/// These are empirical defaults that do not depend on the frame rate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EnvelopeWindow {
    pub before: usize,
    pub after: usize,
}

impl Default for EnvelopeWindow {
    fn default() -> Self {
        Self {
            before: 20,
            after: 30,
        }
    }
}

/// Tunables of the [`ContractionAnalyzer`].
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct AnalyzerParams {
    /// Fraction of most typical frames used as reference. Zero searches the
    /// minimum of the raw signal.
    pub levelset_fraction: LevelsetFraction,
    pub envelope: EnvelopeWindow,
    /// Smooth the signal with a Savitzky-Golay filter before ranking. The
    /// window is `floor(100 * levelset_fraction)` frames.
    pub smoothing: bool,
}

/// One detected contraction.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Contraction {
    pub contraction_start: IndexValue,
    pub contraction_peak: IndexValue,
    pub relaxation_end: IndexValue,
}

impl Contraction {
    /// Builds the envelope around `peak`. Indices are clamped to the signal.
    fn around(peak: IndexValue, signal: &[f64], window: EnvelopeWindow) -> Self {
        let start = peak.0.saturating_sub(window.before);
        let end = peak.0.saturating_add(window.after).min(signal.len() - 1);
        Self {
            contraction_start: (start, signal[start]),
            contraction_peak: peak,
            relaxation_end: (end, signal[end]),
        }
    }

    /// Number of frames from start to end, inclusive.
    pub fn frame_count(&self) -> usize {
        self.relaxation_end.0 - self.contraction_start.0 + 1
    }
}

/// Life cycle of a [`ContractionAnalyzer`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AnalyzerState {
    /// No valid input.
    Unloaded,
    /// Valid input, not yet analyzed.
    Loaded,
    /// The outputs belong to the current input.
    Analyzed,
}

/// Median and ranking of the current input.
#[derive(Debug, Clone, PartialEq)]
struct Levelsets {
    median: f64,
    ranks: Vec<usize>,
}

/// Detects the dominant contraction in a signal plus similarity matrix.
///
/// Outputs are replaced as a whole by every successful [`Self::find_best`]
/// and stay untouched by failed ones.
#[derive(Debug)]
pub struct ContractionAnalyzer {
    id: String,
    params: AnalyzerParams,
    state: AnalyzerState,
    entropies: Vec<f64>,
    matrix: SimilarityMatrix,
    /// Memoized until the next `load()` or a change of the parameters it
    /// depends on.
    levelsets: Option<Levelsets>,
    filtered: Vec<f64>,
    filtered_min_max: Option<(f64, f64)>,
    low_peaks: Vec<IndexValue>,
    contractions: Vec<Contraction>,
    on_contractions: Subscribers<[Contraction]>,
}

impl ContractionAnalyzer {
    pub fn new(id: impl Into<String>, params: AnalyzerParams) -> Self {
        Self {
            id: id.into(),
            params,
            state: AnalyzerState::Unloaded,
            entropies: Vec::new(),
            matrix: SimilarityMatrix::default(),
            levelsets: None,
            filtered: Vec::new(),
            filtered_min_max: None,
            low_peaks: Vec::new(),
            contractions: Vec::new(),
            on_contractions: Subscribers::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn state(&self) -> AnalyzerState {
        self.state
    }

    pub const fn params(&self) -> &AnalyzerParams {
        &self.params
    }

    /// Replaces all parameters. The ranking is recomputed on the next
    /// analysis if smoothing is involved.
    pub fn set_params(&mut self, params: AnalyzerParams) {
        if params.smoothing != self.params.smoothing
            || (params.smoothing && params.levelset_fraction != self.params.levelset_fraction)
        {
            self.levelsets = None;
        }
        self.params = params;
        self.demote();
    }

    /// Sets the levelset fraction as percentage in `0.0..=100.0`.
    pub fn set_median_levelset_pct(&mut self, pct: f32) -> Result<(), AnalyzerError> {
        let levelset_fraction = LevelsetFraction::from_percent(pct)?;
        self.set_params(AnalyzerParams {
            levelset_fraction,
            ..self.params
        });
        Ok(())
    }

    pub fn get_median_levelset_pct(&self) -> f32 {
        self.params.levelset_fraction.percent()
    }

    /// Registers a callback that receives the contractions after every
    /// successful analysis.
    pub fn register_callback(
        &self,
        callback: impl Fn(&[Contraction]) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.on_contractions.register(callback)
    }

    pub fn unregister_callback(&self, id: SubscriptionId) -> bool {
        self.on_contractions.unregister(id)
    }

    /// Loads a new input. The ranking is invalidated.
    ///
    /// The input is stored even if it is invalid, so that a following
    /// [`Self::find_best`] fails as well. Outputs of a previous analysis are
    /// kept until a new analysis succeeds.
    pub fn load(
        &mut self,
        entropies: Vec<f64>,
        matrix: SimilarityMatrix,
    ) -> Result<(), AnalyzerError> {
        self.entropies = entropies;
        self.matrix = matrix;
        self.levelsets = None;
        let verdict = self.verify_input();
        self.state = match verdict {
            Ok(()) => AnalyzerState::Loaded,
            Err(ref e) => {
                log::warn!("[{}] Rejecting analyzer input: {e}", self.id);
                AnalyzerState::Unloaded
            }
        };
        verdict
    }

    /// Checks that the signal is not empty, that the matrix has one row per
    /// signal value, and that all values are finite.
    pub fn verify_input(&self) -> Result<(), AnalyzerError> {
        if self.entropies.is_empty() || self.matrix.is_empty() {
            return Err(AnalyzerError::EmptyInput);
        }
        if self.entropies.len() != self.matrix.side() {
            return Err(AnalyzerError::SizeMismatch {
                signal: self.entropies.len(),
                matrix: self.matrix.side(),
            });
        }
        if let Some(index) = self.entropies.iter().position(|v| !v.is_finite()) {
            return Err(AnalyzerError::NonFiniteInput {
                what: "signal",
                index,
            });
        }
        if let Some(index) = self.matrix.rows().flatten().position(|v| !v.is_finite()) {
            return Err(AnalyzerError::NonFiniteInput {
                what: "matrix",
                index,
            });
        }
        Ok(())
    }

    /// Locates the dominant contraction and publishes it to all registered
    /// callbacks. Returns the new list of contractions.
    ///
    /// On error, no output is modified and no callback fires. Running this
    /// again on unchanged input yields identical results.
    pub fn find_best(&mut self) -> Result<&[Contraction], AnalyzerError> {
        self.verify_input()?;
        let n = self.entropies.len();
        let count = self.params.levelset_fraction.count_of(n);
        if count > 0 && count >= n {
            return Err(AnalyzerError::LevelsetTooLarge { count, frames: n });
        }

        let signal = self.input_signal();
        let levelsets = self.levelsets.get_or_insert_with(|| {
            let (median, ranks) = median_levelsets(&signal);
            Levelsets { median, ranks }
        });

        let filtered = if count == 0 {
            signal
        } else {
            let references = &levelsets.ranks[..count];
            (0..n)
                .map(|i| {
                    references
                        .iter()
                        .map(|&j| {
                            assert!(j < n, "rank {j} out of range");
                            self.matrix.get(j, i)
                        })
                        .sum::<f64>()
                        / count as f64
                })
                .collect::<Vec<_>>()
        };

        // First occurrence wins on ties.
        let peak = filtered
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best: Option<IndexValue>, (i, v)| match best {
                Some((_, best_v)) if best_v <= v => best,
                _ => Some((i, v)),
            })
            .expect("signal is not empty");
        let max = filtered.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        self.clear_outputs();
        self.filtered_min_max = Some((peak.1, max));
        self.low_peaks.push(peak);
        self.contractions
            .push(Contraction::around(peak, &filtered, self.params.envelope));
        self.filtered = filtered;
        self.state = AnalyzerState::Analyzed;

        log::info!("[{}] contraction detected at frame {}", self.id, peak.0);
        self.on_contractions.emit(&self.contractions);
        Ok(&self.contractions)
    }

    /// The signal ranking and the levelset filter operate on.
    fn input_signal(&self) -> Vec<f64> {
        if self.params.smoothing {
            let window = libm::floor(100.0 * self.params.levelset_fraction.raw()) as usize;
            SavitzkyGolay::apply(window, &self.entropies)
        } else {
            self.entropies.clone()
        }
    }

    fn clear_outputs(&mut self) {
        self.filtered.clear();
        self.filtered_min_max = None;
        self.low_peaks.clear();
        self.contractions.clear();
    }

    /// Outputs no longer match the parameters.
    fn demote(&mut self) {
        if self.state == AnalyzerState::Analyzed {
            self.state = AnalyzerState::Loaded;
        }
    }

    /// The loaded per-frame signal.
    pub fn entropies(&self) -> &[f64] {
        &self.entropies
    }

    pub const fn matrix(&self) -> &SimilarityMatrix {
        &self.matrix
    }

    /// The signal the peak was searched in.
    pub fn filtered(&self) -> &[f64] {
        &self.filtered
    }

    /// Minimum and maximum of [`Self::filtered`].
    pub const fn filtered_min_max(&self) -> Option<(f64, f64)> {
        self.filtered_min_max
    }

    /// [`Self::filtered`] scaled to `0.0..=1.0`. A flat signal is returned
    /// unchanged.
    pub fn normalized_filtered(&self) -> Vec<f64> {
        match self.filtered_min_max {
            Some((min, max)) if max > min => self
                .filtered
                .iter()
                .map(|v| (v - min) / (max - min))
                .collect(),
            _ => self.filtered.clone(),
        }
    }

    pub fn low_peaks(&self) -> &[IndexValue] {
        &self.low_peaks
    }

    pub fn contractions(&self) -> &[Contraction] {
        &self.contractions
    }

    /// Median of the ranked signal, once computed.
    pub fn median(&self) -> Option<f64> {
        self.levelsets.as_ref().map(|l| l.median)
    }

    /// Frame indices ordered from most to least typical. Empty until
    /// computed.
    pub fn ranks(&self) -> &[usize] {
        self.levelsets
            .as_ref()
            .map(|l| l.ranks.as_slice())
            .unwrap_or_default()
    }
}
