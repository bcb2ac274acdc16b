//! Frame data flowing through a processing graph.
//!
//! Pixel storage is an `Arc<[u8]>`, so cloning a [`Frame`] (into the cache,
//! to every subscriber, to the writer) never copies pixels.

use crate::pipeline::error::{PipelineError, PipelineResult};
use std::fmt;
use std::sync::Arc;

/// Interleaved 8-bit pixel layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    /// Whether the last channel is alpha.
    pub fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::Rgba8)
    }
}

/// One decoded image.
#[derive(Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    frame_rate: f64,
    data: Arc<[u8]>,
}

impl Frame {
    /// Wrap a pixel buffer, checking its length against the dimensions.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        frame_rate: f64,
        data: Vec<u8>,
    ) -> PipelineResult<Self> {
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(PipelineError::GraphBuild(format!(
                "frame buffer holds {} bytes, {}x{} {:?} needs {}",
                data.len(),
                width,
                height,
                format,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            frame_rate,
            data: data.into(),
        })
    }

    /// A frame with every byte set to `value`.
    pub fn filled(width: u32, height: u32, format: PixelFormat, frame_rate: f64, value: u8) -> Self {
        let len = width as usize * height as usize * format.channels();
        Self {
            width,
            height,
            format,
            frame_rate,
            data: vec![value; len].into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes of the pixel at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.format.channels();
        let start = (y as usize * self.width as usize + x as usize) * channels;
        self.data.get(start..start + channels)
    }

    /// Same geometry and format with a new pixel buffer.
    pub fn with_data(&self, data: Vec<u8>) -> PipelineResult<Self> {
        Self::new(self.width, self.height, self.format, self.frame_rate, data)
    }

    /// Whether two frames share the same pixel allocation.
    pub fn shares_pixels(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("frame_rate", &self.frame_rate)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Inclusive range of frame indices a reader can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeDomain {
    pub first: u64,
    pub last: u64,
}

impl TimeDomain {
    pub fn new(first: u64, last: u64) -> Self {
        Self { first, last }
    }

    /// Number of frames in the range; zero when `last < first`.
    pub fn len(&self) -> u64 {
        if self.last < self.first {
            0
        } else {
            (self.last - self.first).saturating_add(1)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: u64) -> bool {
        index >= self.first && index <= self.last
    }
}
