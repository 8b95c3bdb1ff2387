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

//! Detects contractions of a beating cell in a sequence of microscopy
//! frames, without any annotation.
//!
//! The idea: frames of a relaxed cell look alike, frames of a contracting
//! cell differ from them. This crate
//!
//! - ingests frames with strictly increasing capture times into a
//!   [`TimeIndexCache`] (blocking or on a worker thread),
//! - computes the pairwise [`SimilarityMatrix`] (squared correlation) of a
//!   frame range and reduces every row to one value per frame, and
//! - ranks frames by how typical they are, averages the similarity to the
//!   most typical frames, and reports the minimum of that signal as the
//!   [`Contraction`] peak.
//!
//! Decoding of movies or image files is not part of this crate. Implement
//! [`FrameSource`] for your decoder or pass a decode function to
//! [`ImageDirectorySource`].
//!
//! ## Example
//! ```rust
//! use contraction_detector::{
//!     AnalyzerParams, ContractionAnalyzer, Frame, LevelsetFraction, ProducerConfig,
//!     SimilarityProducer,
//! };
//!
//! // Frame 15 looks different from all other frames.
//! let frames = (0..30)
//!     .map(|k| {
//!         Frame::from_fn(8, 8, |x, y| if k == 15 { (y * 30) as u8 } else { (x * 30) as u8 })
//!             .unwrap()
//!     })
//!     .collect::<Vec<_>>();
//!
//! let mut producer = SimilarityProducer::new("recording-1", ProducerConfig::default());
//! producer.load_frames(frames, 1.0 / 30.0).unwrap();
//! producer.compute(0, 0).unwrap();
//!
//! let mut analyzer = ContractionAnalyzer::new(
//!     "recording-1",
//!     AnalyzerParams {
//!         levelset_fraction: LevelsetFraction::try_from(0.1).unwrap(),
//!         ..Default::default()
//!     },
//! );
//! analyzer
//!     .load(producer.entropies().to_vec(), producer.matrix().unwrap().clone())
//!     .unwrap();
//! let contraction = analyzer.find_best().unwrap()[0];
//! assert_eq!(contraction.contraction_peak.0, 15);
//! ```
//!
//! ## Logging
//! The crate logs through the [`log`] facade. Install a logger of your choice
//! to see progress and diagnostics.

pub mod events;
pub mod layer_analysis;
pub mod layer_input_processing;

#[cfg(test)]
mod test_utils;

pub use layer_analysis::contraction::{
    AnalyzerError, AnalyzerParams, AnalyzerState, Contraction, ContractionAnalyzer,
    EnvelopeWindow, IndexValue,
};
pub use layer_analysis::median_levelset::median_levelsets;
pub use layer_analysis::producer::{
    OrderedEntry, OutputOrder, ProducerConfig, ProducerError, SimilarityProducer,
};
pub use layer_analysis::savgol::SavitzkyGolay;
pub use layer_analysis::similarity::SimilarityMatrix;
pub use layer_input_processing::f64::{InvalidF64Error, LevelsetFraction, Seconds};
pub use layer_input_processing::frame::{Frame, FrameError, FrameSize};
pub use layer_input_processing::loader::{ContentLoaded, FrameLoaded, LoadHandle};
pub use layer_input_processing::source::{
    FrameSource, ImageDirectorySource, InMemorySource, LoadError, SizeMapping, SourceFrame,
    SourceKind,
};
pub use layer_input_processing::time_index_cache::{IndexTime, InsertError, TimeIndexCache};
