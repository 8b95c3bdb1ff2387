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

//! Module for [`Frame`], the 8-bit single-channel pixel buffer all analysis
//! operates on.

use core::fmt::{Display, Formatter};
use thiserror::Error;

/// Possible errors when constructing a [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame size {0} has a zero dimension")]
    EmptySize(FrameSize),
    #[error("frame of size {0} needs {1} pixels but got {2}")]
    PixelCountMismatch(FrameSize, usize, usize),
}

/// Width and height of a [`Frame`] in pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameSize {
    pub width: usize,
    pub height: usize,
}

impl FrameSize {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Number of pixels.
    pub const fn area(self) -> usize {
        self.width * self.height
    }
}

impl Display for FrameSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Immutable 8-bit single-channel image, stored row-major.
///
/// Colored sources are expected to be reduced to one channel (for example the
/// red channel) by the decoder before frames enter this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    size: FrameSize,
    pixels: Vec<u8>,
}

impl Frame {
    /// Creates a new frame. The pixel buffer must hold exactly
    /// `width * height` values.
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self, FrameError> {
        let size = FrameSize::new(width, height);
        if size.area() == 0 {
            return Err(FrameError::EmptySize(size));
        }
        if pixels.len() != size.area() {
            return Err(FrameError::PixelCountMismatch(
                size,
                size.area(),
                pixels.len(),
            ));
        }
        Ok(Self { size, pixels })
    }

    /// Creates a frame where every pixel has the same value.
    pub fn filled(width: usize, height: usize, value: u8) -> Result<Self, FrameError> {
        Self::new(width, height, vec![value; width * height])
    }

    /// Creates a frame by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize) -> u8,
    ) -> Result<Self, FrameError> {
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect::<Vec<_>>();
        Self::new(width, height, pixels)
    }

    #[must_use]
    pub const fn size(&self) -> FrameSize {
        self.size
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.size.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.size.height
    }

    /// Row-major pixel data.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the pixel at the given coordinate.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        assert!(x < self.width() && y < self.height());
        self.pixels[y * self.width() + x]
    }

    /// Returns a copy resampled to `size` using bilinear interpolation.
    ///
    /// Returns a plain clone if the size already matches.
    pub fn resized(&self, size: FrameSize) -> Result<Self, FrameError> {
        if size == self.size {
            return Ok(self.clone());
        }
        if size.area() == 0 {
            return Err(FrameError::EmptySize(size));
        }

        // Pixel centers of the target map onto pixel centers of the source.
        let scale_x = self.width() as f64 / size.width as f64;
        let scale_y = self.height() as f64 / size.height as f64;
        let max_x = (self.width() - 1) as f64;
        let max_y = (self.height() - 1) as f64;

        Self::from_fn(size.width, size.height, |x, y| {
            let src_x = ((x as f64 + 0.5) * scale_x - 0.5).clamp(0.0, max_x);
            let src_y = ((y as f64 + 0.5) * scale_y - 0.5).clamp(0.0, max_y);
            let x0 = libm::floor(src_x) as usize;
            let y0 = libm::floor(src_y) as usize;
            let x1 = (x0 + 1).min(self.width() - 1);
            let y1 = (y0 + 1).min(self.height() - 1);
            let fx = src_x - x0 as f64;
            let fy = src_y - y0 as f64;

            let top = self.pixel(x0, y0) as f64 * (1.0 - fx) + self.pixel(x1, y0) as f64 * fx;
            let bottom = self.pixel(x0, y1) as f64 * (1.0 - fx) + self.pixel(x1, y1) as f64 * fx;
            let value = top * (1.0 - fy) + bottom * fy;
            libm::round(value).clamp(0.0, 255.0) as u8
        })
    }
}
