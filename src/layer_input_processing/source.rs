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

//! Frame sources and the sizing policy that normalizes their output.
//!
//! Decoding image or movie formats is not part of this crate. Decoders plug
//! in either by implementing [`FrameSource`] (movies) or by handing a decode
//! function to [`ImageDirectorySource`].

use super::frame::{Frame, FrameError, FrameSize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions [`ImageDirectorySource`] picks up.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "png", "JPG", "jpeg"];

/// Length of extension-less file names (UUIDs) that are accepted as images,
/// too.
const ANONYMOUS_NAME_LEN: usize = 36;

/// Possible errors when loading frames.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("path {0:?} does not exist or is not a directory")]
    BadPath(PathBuf),
    #[error("i/o error while listing {0:?}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("the source did not provide any frames")]
    NoFrames,
    #[error("failed to decode {origin}: {reason}")]
    Decode { origin: String, reason: String },
    #[error("invalid frame from {0}")]
    InvalidFrame(String, #[source] FrameError),
    #[error("frames have {0} different sizes, but the sizing policy forbids mixed sizes")]
    MixedSizes(usize),
    #[error("loading was cancelled after {0} frames")]
    Cancelled(usize),
    #[error("frame period must be a positive number of seconds, got {0}")]
    InvalidFramePeriod(f64),
}

/// Frame periods must be finite and positive so capture times strictly
/// increase.
fn checked_frame_period(frame_period_s: f64) -> Result<f64, LoadError> {
    if frame_period_s.is_finite() && frame_period_s > 0.0 {
        Ok(frame_period_s)
    } else {
        Err(LoadError::InvalidFramePeriod(frame_period_s))
    }
}

/// The kind of content a [`FrameSource`] reads.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// A movie decoded frame by frame.
    Movie,
    /// A directory of still images.
    ImageDirectory,
    /// Frames that already live in memory.
    InMemory,
}

/// A decoded frame as delivered by a [`FrameSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFrame {
    pub frame: Frame,
    /// Capture time in seconds. Must be strictly increasing per source.
    pub time: f64,
    /// Human readable identifier of where the frame came from, such as a file
    /// path or `"frame-12"`.
    pub origin: String,
}

/// Common abstraction over anything that produces frames in capture order.
///
/// Implementations are consumed on a worker thread, therefore they must be
/// [`Send`].
pub trait FrameSource: Iterator<Item = Result<SourceFrame, LoadError>> + Send {
    /// Convenient getter for the kind of source.
    fn kind(&self) -> SourceKind;

    /// Number of frames, if known upfront. Used for progress reporting.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

/// Frames that already live in memory, spaced by a fixed frame period.
#[derive(Debug)]
pub struct InMemorySource {
    frames: std::vec::IntoIter<Frame>,
    frame_period_s: f64,
    total: usize,
    next_index: usize,
}

impl InMemorySource {
    /// Creates a source that timestamps frame `i` with `i * frame_period_s`.
    /// Fails if the frame period is not a positive finite number.
    pub fn new(frames: Vec<Frame>, frame_period_s: f64) -> Result<Self, LoadError> {
        let frame_period_s = checked_frame_period(frame_period_s)?;
        Ok(Self {
            total: frames.len(),
            frames: frames.into_iter(),
            frame_period_s,
            next_index: 0,
        })
    }
}

impl Iterator for InMemorySource {
    type Item = Result<SourceFrame, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.frames.next()?;
        let index = self.next_index;
        self.next_index += 1;
        Some(Ok(SourceFrame {
            frame,
            time: index as f64 * self.frame_period_s,
            origin: format!("frame-{index}"),
        }))
    }
}

impl FrameSource for InMemorySource {
    fn kind(&self) -> SourceKind {
        SourceKind::InMemory
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.total)
    }
}

/// Decoder function for [`ImageDirectorySource`].
pub type ImageDecoder = Box<dyn FnMut(&Path) -> Result<Frame, String> + Send>;

/// A directory of still images, read in file name order.
///
/// Picks up regular files with one of the [`SUPPORTED_EXTENSIONS`] and
/// extension-less files with UUID-like names.
pub struct ImageDirectorySource {
    paths: std::vec::IntoIter<PathBuf>,
    decoder: ImageDecoder,
    frame_period_s: f64,
    total: usize,
    next_index: usize,
}

impl core::fmt::Debug for ImageDirectorySource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ImageDirectorySource")
            .field("total", &self.total)
            .field("next_index", &self.next_index)
            .finish()
    }
}

impl ImageDirectorySource {
    /// Lists the directory and prepares decoding. Fails if the path is not a
    /// directory, contains no images, or the frame period is invalid.
    /// Unreadable directory entries are skipped with a warning.
    pub fn open(
        dir: impl AsRef<Path>,
        frame_period_s: f64,
        decoder: impl FnMut(&Path) -> Result<Frame, String> + Send + 'static,
    ) -> Result<Self, LoadError> {
        let frame_period_s = checked_frame_period(frame_period_s)?;
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(LoadError::BadPath(dir.to_path_buf()));
        }

        let mut paths = std::fs::read_dir(dir)
            .map_err(|e| LoadError::Io(dir.to_path_buf(), e))?
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    log::warn!("Skipping unreadable entry in {dir:?}: {e}");
                    None
                }
            })
            .filter(|path| path.is_file())
            .filter(|path| {
                let accepted = is_supported_image_name(path);
                if !accepted {
                    log::trace!("Skipping {path:?}");
                }
                accepted
            })
            .collect::<Vec<_>>();
        paths.sort();

        if paths.is_empty() {
            return Err(LoadError::NoFrames);
        }
        log::debug!("Found {} images in {dir:?}", paths.len());

        Ok(Self {
            total: paths.len(),
            paths: paths.into_iter(),
            decoder: Box::new(decoder),
            frame_period_s,
            next_index: 0,
        })
    }
}

fn is_supported_image_name(path: &Path) -> bool {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => SUPPORTED_EXTENSIONS.contains(&ext),
        None => path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.len() == ANONYMOUS_NAME_LEN),
    }
}

impl Iterator for ImageDirectorySource {
    type Item = Result<SourceFrame, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        let index = self.next_index;
        self.next_index += 1;
        let origin = path.display().to_string();
        let result = (self.decoder)(&path)
            .map_err(|reason| LoadError::Decode {
                origin: origin.clone(),
                reason,
            })
            .map(|frame| SourceFrame {
                frame,
                time: index as f64 * self.frame_period_s,
                origin,
            });
        Some(result)
    }
}

impl FrameSource for ImageDirectorySource {
    fn kind(&self) -> SourceKind {
        SourceKind::ImageDirectory
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.total)
    }
}

/// What to do when frames of one source have different sizes.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum SizeMapping {
    /// Fail if not all frames have the same size.
    #[default]
    ReportFail,
    /// Only keep the frames that have the most common size.
    MostCommon,
    /// Resample all frames to the most common size.
    ResizeToMostCommon,
}

/// Returns the most common frame size. On a tie, the size seen first wins.
pub fn most_common_size<'a>(frames: impl Iterator<Item = &'a Frame>) -> Option<FrameSize> {
    // size -> (count, first occurrence)
    let mut histogram = BTreeMap::<FrameSize, (usize, usize)>::new();
    for (i, frame) in frames.enumerate() {
        histogram.entry(frame.size()).or_insert((0, i)).0 += 1;
    }
    histogram
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(size, _)| size)
}

/// Normalizes a list of frames to a common size according to `policy`.
///
/// Returns the normalized frames together with their position in the input
/// list, as [`SizeMapping::MostCommon`] may drop frames.
pub fn apply_size_mapping(
    frames: Vec<Frame>,
    policy: SizeMapping,
) -> Result<Vec<(usize, Frame)>, LoadError> {
    let target = most_common_size(frames.iter()).ok_or(LoadError::NoFrames)?;
    let distinct_sizes = frames
        .iter()
        .map(Frame::size)
        .collect::<std::collections::BTreeSet<_>>()
        .len();

    if distinct_sizes == 1 {
        return Ok(frames.into_iter().enumerate().collect());
    }

    match policy {
        SizeMapping::ReportFail => Err(LoadError::MixedSizes(distinct_sizes)),
        SizeMapping::MostCommon => {
            let before = frames.len();
            let kept = frames
                .into_iter()
                .enumerate()
                .filter(|(_, frame)| frame.size() == target)
                .collect::<Vec<_>>();
            log::warn!(
                "Keeping {} of {before} frames with the most common size {target}",
                kept.len()
            );
            Ok(kept)
        }
        SizeMapping::ResizeToMostCommon => {
            log::info!("Resizing frames of {distinct_sizes} sizes to {target}");
            frames
                .into_iter()
                .enumerate()
                .map(|(i, frame)| {
                    frame
                        .resized(target)
                        .map(|frame| (i, frame))
                        .map_err(|e| LoadError::InvalidFrame(format!("frame-{i}"), e))
                })
                .collect()
        }
    }
}
