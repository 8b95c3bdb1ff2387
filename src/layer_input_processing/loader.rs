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

//! Module for ingesting frames from a [`FrameSource`] on a worker thread.
//!
//! Decoding may block for a long time, so it never happens on the caller's
//! thread. The worker inserts every decoded frame into a shared
//! [`TimeIndexCache`] and only then announces it via [`FrameLoaded`].

use super::source::{FrameSource, LoadError, SourceFrame};
use super::time_index_cache::TimeIndexCache;
use crate::events::Subscribers;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// A frame was decoded and is now available in the cache.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameLoaded {
    /// Ordinal index in the cache.
    pub index: i64,
    /// Capture time in seconds.
    pub time: f64,
}

/// All frames of a source were ingested.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ContentLoaded {
    /// Number of frames in the cache.
    pub frames: usize,
}

/// Subscriber lists for loading progress.
#[derive(Debug, Default)]
pub struct LoadEvents {
    pub frame_loaded: Subscribers<FrameLoaded>,
    pub content_loaded: Subscribers<ContentLoaded>,
}

#[derive(Debug, Default)]
struct Progress {
    loaded: AtomicUsize,
    rejected: AtomicUsize,
    finished: Mutex<bool>,
    finished_cv: Condvar,
}

impl Progress {
    fn mark_finished(&self) {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.finished_cv.notify_all();
    }
}

/// Marks the progress as finished when dropped, also if the worker panics.
struct FinishGuard(Arc<Progress>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.mark_finished();
    }
}

/// Handle to a running load. The owner can poll, block, cancel, or join.
///
/// Dropping the handle cancels the load and joins the worker, so no worker
/// outlives its owner.
#[derive(Debug)]
pub struct LoadHandle {
    worker: Option<JoinHandle<Result<usize, LoadError>>>,
    stop: Arc<AtomicBool>,
    progress: Arc<Progress>,
}

impl LoadHandle {
    /// Requests cooperative cancellation. The worker stops before the next
    /// frame; a frame that is decoding right now is finished first.
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Returns a clone of the stop flag, e.g., to wire it to a signal
    /// handler.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Number of frames ingested so far.
    pub fn loaded(&self) -> usize {
        self.progress.loaded.load(Ordering::SeqCst)
    }

    /// Number of frames dropped because of a non-increasing timestamp.
    pub fn rejected(&self) -> usize {
        self.progress.rejected.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        *self
            .progress
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the worker is done, without consuming the handle.
    pub fn wait(&self) {
        let mut finished = self
            .progress
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*finished {
            finished = self
                .progress
                .finished_cv
                .wait(finished)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Joins the worker and returns the number of ingested frames.
    ///
    /// A panic of the worker is propagated.
    pub fn join(mut self) -> Result<usize, LoadError> {
        let worker = self.worker.take().expect("worker is only taken once");
        match worker.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl Drop for LoadHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.cancel();
            let _ = worker.join();
        }
    }
}

/// Starts a worker thread that ingests all frames of `source` into `cache`.
///
/// Frames with a timestamp that does not continue the cache's timeline are
/// dropped. A decode error stops the load; frames ingested before stay
/// valid. If no frame was added, the load fails with [`LoadError::NoFrames`]
/// and "content loaded" does not fire.
pub fn spawn_loader(
    source: impl FrameSource + 'static,
    cache: Arc<TimeIndexCache<SourceFrame>>,
    events: Arc<LoadEvents>,
) -> LoadHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let progress = Arc::new(Progress::default());

    let worker = {
        let stop = stop.clone();
        let progress = progress.clone();
        thread::Builder::new()
            .name(std::format!("frame-loader-{:?}", source.kind()))
            .spawn(move || {
                let _guard = FinishGuard(progress.clone());
                ingest(source, &cache, &events, &stop, &progress)
            })
            .expect("should be able to spawn the loader thread")
    };

    LoadHandle {
        worker: Some(worker),
        stop,
        progress,
    }
}

/// Like [`spawn_loader`] but ingests on the calling thread.
pub fn load_blocking(
    source: impl FrameSource,
    cache: &TimeIndexCache<SourceFrame>,
    events: &LoadEvents,
) -> Result<usize, LoadError> {
    let progress = Progress::default();
    ingest(source, cache, events, &AtomicBool::new(false), &progress)
}

fn ingest(
    source: impl FrameSource,
    cache: &TimeIndexCache<SourceFrame>,
    events: &LoadEvents,
    stop: &AtomicBool,
    progress: &Progress,
) -> Result<usize, LoadError> {
    let kind = source.kind();
    let total = source.len_hint();
    log::debug!("Loading frames from {kind:?} source ({total:?} frames expected)");
    let begin = Instant::now();

    for item in source {
        if stop.load(Ordering::SeqCst) {
            let loaded = progress.loaded.load(Ordering::SeqCst);
            log::debug!("Loading cancelled after {loaded} frames");
            return Err(LoadError::Cancelled(loaded));
        }

        let source_frame = item.inspect_err(|e| log::warn!("Stopping load: {e}"))?;
        match cache.insert(&source_frame, source_frame.time) {
            Ok(it) => {
                let loaded = progress.loaded.fetch_add(1, Ordering::SeqCst) + 1;
                log::trace!("Loaded frame {} at {} ({loaded}/{total:?})", it.index, it.time);
                events.frame_loaded.emit(&FrameLoaded {
                    index: it.index,
                    time: it.time.raw(),
                });
            }
            Err(e) => {
                progress.rejected.fetch_add(1, Ordering::SeqCst);
                log::debug!("Dropping frame {}: {e}", source_frame.origin);
            }
        }
    }

    let loaded = progress.loaded.load(Ordering::SeqCst);
    if loaded == 0 {
        log::debug!(
            "No new frames from {kind:?} source, {} rejected",
            progress.rejected.load(Ordering::SeqCst)
        );
        return Err(LoadError::NoFrames);
    }
    let frames = cache.count();
    log::debug!("Loaded {frames} frames in {:?}", begin.elapsed());
    events.content_loaded.emit(&ContentLoaded { frames });
    Ok(loaded)
}
