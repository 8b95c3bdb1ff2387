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

//! Module for [`SimilarityProducer`].
//!
//! The producer owns the frame cache of one recording. Frames are ingested
//! from a [`FrameSource`], either blocking or on a worker thread. On request,
//! a frame range is normalized to a common size and turned into a
//! [`SimilarityMatrix`] plus the per-frame signals derived from it.

use super::similarity::{SimilarityMatrix, DEFAULT_SELF_SCORE_EPSILON};
use crate::events::SubscriptionId;
use crate::layer_input_processing::loader::{
    load_blocking, spawn_loader, ContentLoaded, FrameLoaded, LoadEvents, LoadHandle,
};
use crate::layer_input_processing::source::{
    apply_size_mapping, FrameSource, InMemorySource, LoadError, SizeMapping, SourceFrame,
};
use crate::layer_input_processing::time_index_cache::TimeIndexCache;
use crate::Frame;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Possible errors of the [`SimilarityProducer`].
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("no frames are loaded")]
    NoFrames,
    #[error("frame range starting at {start} is empty, only {available} frames are loaded")]
    EmptyRange { start: usize, available: usize },
    #[error("failed to load frames")]
    Load(#[from] LoadError),
}

/// Configuration of a [`SimilarityProducer`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ProducerConfig {
    /// The diagonal of the matrix is `1.0 + self_score_epsilon`.
    pub self_score_epsilon: f64,
    pub size_mapping: SizeMapping,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            self_score_epsilon: DEFAULT_SELF_SCORE_EPSILON,
            size_mapping: SizeMapping::default(),
        }
    }
}

/// Order of [`SimilarityProducer::ordered_input_output`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OutputOrder {
    /// Capture order.
    Input,
    /// Lowest signal value first.
    Ascending,
    /// Highest signal value first.
    Descending,
}

/// One frame of the computed output.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedEntry {
    /// Position in the signal.
    pub index: usize,
    /// Index of the frame in the cache.
    pub frame_index: i64,
    pub score: f64,
    pub origin: String,
}

/// Computes the self-similarity of a frame sequence.
#[derive(Debug)]
pub struct SimilarityProducer {
    id: String,
    config: ProducerConfig,
    cache: Arc<TimeIndexCache<SourceFrame>>,
    events: Arc<LoadEvents>,
    matrix: Option<SimilarityMatrix>,
    entropies: Vec<f64>,
    mean_projection: Vec<f64>,
    /// Cache index and origin per signal position.
    frames: Vec<(i64, String)>,
    /// Sorted views, computed on first request.
    ordered: HashMap<OutputOrder, Vec<OrderedEntry>>,
}

impl SimilarityProducer {
    pub fn new(id: impl Into<String>, config: ProducerConfig) -> Self {
        Self {
            id: id.into(),
            config,
            cache: Arc::new(TimeIndexCache::new()),
            events: Arc::new(LoadEvents::default()),
            matrix: None,
            entropies: Vec::new(),
            mean_projection: Vec::new(),
            frames: Vec::new(),
            ordered: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// The cache all sources load into.
    pub const fn cache(&self) -> &Arc<TimeIndexCache<SourceFrame>> {
        &self.cache
    }

    /// Registers a callback that fires after a frame was inserted into the
    /// cache. Runs on the loading thread.
    pub fn on_frame_loaded(
        &self,
        callback: impl Fn(&FrameLoaded) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.events.frame_loaded.register(callback)
    }

    /// Registers a callback that fires once a source is fully ingested.
    /// Runs on the loading thread.
    pub fn on_content_loaded(
        &self,
        callback: impl Fn(&ContentLoaded) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.events.content_loaded.register(callback)
    }

    /// Ingests all frames of `source` on the calling thread. Returns the
    /// number of frames added to the cache.
    pub fn load_source(&self, source: impl FrameSource) -> Result<usize, ProducerError> {
        log::debug!("[{}] Loading {:?} source", self.id, source.kind());
        Ok(load_blocking(source, &self.cache, &self.events)?)
    }

    /// Ingests in-memory frames spaced by `frame_period_s` seconds.
    pub fn load_frames(
        &self,
        frames: Vec<Frame>,
        frame_period_s: f64,
    ) -> Result<usize, ProducerError> {
        self.load_source(InMemorySource::new(frames, frame_period_s)?)
    }

    /// Ingests all frames of `source` on a worker thread.
    pub fn load_source_in_background(&self, source: impl FrameSource + 'static) -> LoadHandle {
        log::debug!(
            "[{}] Loading {:?} source in background",
            self.id,
            source.kind()
        );
        spawn_loader(source, self.cache.clone(), self.events.clone())
    }

    /// Number of frames in the cache.
    pub fn frame_count(&self) -> usize {
        self.cache.count()
    }

    /// Computes the matrix and the signals over `count` frames beginning at
    /// frame `start`. A `count` of zero selects all remaining frames.
    /// Returns the number of frames in the output.
    ///
    /// Previous outputs are discarded first, so they are empty on error.
    pub fn compute(&mut self, start: usize, count: usize) -> Result<usize, ProducerError> {
        self.clear_outputs();

        let cached = self.cache.frames();
        if cached.is_empty() {
            return Err(ProducerError::NoFrames);
        }
        if start >= cached.len() {
            return Err(ProducerError::EmptyRange {
                start,
                available: cached.len(),
            });
        }
        let end = match count {
            0 => cached.len(),
            n => start.saturating_add(n).min(cached.len()),
        };
        let selected = &cached[start..end];

        let normalized = apply_size_mapping(
            selected.iter().map(|(_, f)| f.frame.clone()).collect(),
            self.config.size_mapping,
        )?;
        let refs = normalized.iter().map(|(_, f)| f).collect::<Vec<_>>();

        let begin = Instant::now();
        let matrix = SimilarityMatrix::compute(&refs, self.config.self_score_epsilon);
        log::debug!(
            "[{}] Computed {n}x{n} similarity matrix in {:?}",
            self.id,
            begin.elapsed(),
            n = matrix.side()
        );

        self.frames = normalized
            .iter()
            .map(|(pos, _)| {
                let (it, source_frame) = &selected[*pos];
                (it.index, source_frame.origin.clone())
            })
            .collect();
        self.entropies = matrix.entropy_signal();
        self.mean_projection = matrix.mean_projection();
        self.matrix = Some(matrix);
        Ok(self.entropies.len())
    }

    fn clear_outputs(&mut self) {
        self.matrix = None;
        self.entropies.clear();
        self.mean_projection.clear();
        self.frames.clear();
        self.ordered.clear();
    }

    /// The matrix of the last successful computation.
    pub const fn matrix(&self) -> Option<&SimilarityMatrix> {
        self.matrix.as_ref()
    }

    /// Per-frame `1 - normalized entropy` of the matrix rows.
    pub fn entropies(&self) -> &[f64] {
        &self.entropies
    }

    /// Per-frame mean of the matrix rows.
    pub fn mean_projection(&self) -> &[f64] {
        &self.mean_projection
    }

    /// Returns `(index, score, origin)` of every frame of the last
    /// computation, where the score is the entropy signal. Sorting is stable
    /// and each order is computed only once per computation.
    pub fn ordered_input_output(&mut self, order: OutputOrder) -> &[OrderedEntry] {
        let Self {
            ordered,
            entropies,
            frames,
            ..
        } = self;
        ordered.entry(order).or_insert_with(|| {
            let mut entries = entropies
                .iter()
                .zip(frames.iter())
                .enumerate()
                .map(|(index, (&score, (frame_index, origin)))| OrderedEntry {
                    index,
                    frame_index: *frame_index,
                    score,
                    origin: origin.clone(),
                })
                .collect::<Vec<_>>();
            match order {
                OutputOrder::Input => {}
                OutputOrder::Ascending => entries.sort_by(|a, b| a.score.total_cmp(&b.score)),
                OutputOrder::Descending => entries.sort_by(|a, b| b.score.total_cmp(&a.score)),
            }
            entries
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use assert2::check;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn producer_with(frames: Vec<Frame>, size_mapping: SizeMapping) -> SimilarityProducer {
        let producer = SimilarityProducer::new(
            "test",
            ProducerConfig {
                size_mapping,
                ..Default::default()
            },
        );
        producer.load_frames(frames, 0.04).unwrap();
        producer
    }

    #[test]
    fn is_send_and_sync() {
        fn accept<I: Send + Sync>() {}

        accept::<SimilarityProducer>();
    }

    #[test]
    fn computes_symmetric_matrix_over_all_frames() {
        let mut producer = producer_with(
            test_utils::beating_disc_frames(20, 10, 5),
            SizeMapping::ReportFail,
        );
        check!(producer.frame_count() == 20);
        check!(producer.compute(0, 0).unwrap() == 20);

        let matrix = producer.matrix().unwrap();
        check!(matrix.side() == 20);
        check!(matrix.is_symmetric());
        check!(producer.entropies().len() == 20);
        check!(producer.mean_projection().len() == 20);
        check!(producer.entropies() == matrix.entropy_signal().as_slice());
    }

    #[test]
    fn frame_ranges() {
        let mut producer = producer_with(
            test_utils::beating_disc_frames(10, 10, 5),
            SizeMapping::ReportFail,
        );
        check!(producer.compute(4, 3).unwrap() == 3);
        let input = producer.ordered_input_output(OutputOrder::Input);
        check!(input.iter().map(|e| e.frame_index).collect::<Vec<_>>() == [4, 5, 6]);
        check!(input[0].origin == "frame-4");

        // Count beyond the end is clamped.
        check!(producer.compute(8, 100).unwrap() == 2);
        check!(matches!(
            producer.compute(10, 0),
            Err(ProducerError::EmptyRange {
                start: 10,
                available: 10
            })
        ));
        // A failed computation leaves no outputs behind.
        check!(producer.matrix().is_none());
        check!(producer.entropies().is_empty());
    }

    #[test]
    fn nothing_loaded() {
        let mut producer = SimilarityProducer::new("empty", ProducerConfig::default());
        check!(matches!(producer.compute(0, 0), Err(ProducerError::NoFrames)));
        check!(matches!(
            producer.load_frames(Vec::new(), 0.1),
            Err(ProducerError::Load(LoadError::NoFrames))
        ));
    }

    #[test]
    fn size_mapping_policies() {
        let mut frames = test_utils::beating_disc_frames(6, 6, 2);
        frames[2] = Frame::filled(8, 8, 100).unwrap();

        let mut producer = producer_with(frames.clone(), SizeMapping::ReportFail);
        check!(matches!(
            producer.compute(0, 0),
            Err(ProducerError::Load(LoadError::MixedSizes(2)))
        ));

        let mut producer = producer_with(frames.clone(), SizeMapping::MostCommon);
        check!(producer.compute(0, 0).unwrap() == 5);
        let indices = producer
            .ordered_input_output(OutputOrder::Input)
            .iter()
            .map(|e| e.frame_index)
            .collect::<Vec<_>>();
        check!(indices == [0, 1, 3, 4, 5]);

        let mut producer = producer_with(frames, SizeMapping::ResizeToMostCommon);
        check!(producer.compute(0, 0).unwrap() == 6);
    }

    #[test]
    fn ordered_outputs_are_stable_and_cached() {
        let mut producer = producer_with(
            test_utils::beating_disc_frames(16, 16, 9),
            SizeMapping::ReportFail,
        );
        producer.compute(0, 0).unwrap();

        let input = producer.ordered_input_output(OutputOrder::Input).to_vec();
        check!(input.iter().map(|e| e.index).eq(0..16));

        let ascending = producer.ordered_input_output(OutputOrder::Ascending).to_vec();
        check!(ascending.windows(2).all(|w| w[0].score <= w[1].score));
        let descending = producer.ordered_input_output(OutputOrder::Descending).to_vec();
        check!(descending.windows(2).all(|w| w[0].score >= w[1].score));
        for w in ascending.windows(2).chain(descending.windows(2)) {
            if w[0].score == w[1].score {
                check!(w[0].index < w[1].index);
            }
        }

        check!(producer.ordered.len() == 3);
        check!(producer.ordered_input_output(OutputOrder::Ascending) == ascending.as_slice());
        producer.compute(0, 8).unwrap();
        check!(producer.ordered.is_empty());
    }

    #[test]
    fn background_loading_notifies_subscribers() {
        let producer = SimilarityProducer::new("bg", ProducerConfig::default());
        let frames_seen = Arc::new(AtomicUsize::new(0));
        let content_seen = Arc::new(AtomicUsize::new(0));
        {
            let frames_seen = frames_seen.clone();
            producer.on_frame_loaded(move |_| {
                frames_seen.fetch_add(1, Ordering::SeqCst);
            });
            let content_seen = content_seen.clone();
            producer.on_content_loaded(move |e| content_seen.store(e.frames, Ordering::SeqCst));
        }

        let source =
            InMemorySource::new(test_utils::beating_disc_frames(12, 12, 4), 0.05).unwrap();
        let handle = producer.load_source_in_background(source);
        check!(handle.join().unwrap() == 12);
        check!(frames_seen.load(Ordering::SeqCst) == 12);
        check!(content_seen.load(Ordering::SeqCst) == 12);
        check!(producer.frame_count() == 12);
        check!(producer.cache().get_frame_at_time(0.26).unwrap().origin == "frame-5");
    }

    #[test]
    fn reloading_the_same_timeline_adds_nothing() {
        let frames = test_utils::beating_disc_frames(5, 5, 1);
        let producer = producer_with(frames.clone(), SizeMapping::ReportFail);
        check!(matches!(
            producer.load_frames(frames, 0.04),
            Err(ProducerError::Load(LoadError::NoFrames))
        ));
        check!(producer.frame_count() == 5);
    }

    #[test]
    fn invalid_frame_period_is_reported() {
        let producer = SimilarityProducer::new("test", ProducerConfig::default());
        check!(matches!(
            producer.load_frames(test_utils::beating_disc_frames(3, 3, 1), 0.0),
            Err(ProducerError::Load(LoadError::InvalidFramePeriod(_)))
        ));
        check!(producer.frame_count() == 0);
    }
}
