//! TestPatternNode: synthetic reader.
//!
//! Produces an RGB gradient whose blue channel shifts with the frame index,
//! so consecutive frames are distinguishable without any files on disk.

use super::{expect_float, expect_int, expect_positive, TEST_PATTERN_ID};
use crate::config::ConfigValue;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::frame::{Frame, PixelFormat, TimeDomain};
use crate::pipeline::host::{PluginDescriptor, PluginKind};

pub const PARAM_WIDTH: &str = "Width";
pub const PARAM_HEIGHT: &str = "Height";
pub const PARAM_FRAME_COUNT: &str = "Frame count";
pub use super::PARAM_FRAME_RATE;

const DEFAULT_WIDTH: u32 = 64;
const DEFAULT_HEIGHT: u32 = 48;
const DEFAULT_FRAME_COUNT: u64 = 24;
const MAX_FRAME_BYTES: usize = 1 << 30;

pub struct TestPatternNode {
    width: u32,
    height: u32,
    frame_count: u64,
    frame_rate: f64,
}

impl TestPatternNode {
    pub fn new() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_count: DEFAULT_FRAME_COUNT,
            frame_rate: crate::config::DEFAULT_FRAME_RATE,
        }
    }

    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(TEST_PATTERN_ID, "Test pattern", PluginKind::Reader)
            .with_parameter(PARAM_WIDTH, DEFAULT_WIDTH as i64)
            .with_parameter(PARAM_HEIGHT, DEFAULT_HEIGHT as i64)
            .with_parameter(PARAM_FRAME_COUNT, DEFAULT_FRAME_COUNT as i64)
            .with_parameter(PARAM_FRAME_RATE, crate::config::DEFAULT_FRAME_RATE)
    }

    pub fn identifier(&self) -> &str {
        TEST_PATTERN_ID
    }

    pub fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        match key {
            PARAM_WIDTH => self.width = expect_positive(key, value)?,
            PARAM_HEIGHT => self.height = expect_positive(key, value)?,
            PARAM_FRAME_COUNT => {
                let count = expect_int(key, value)?;
                self.frame_count = u64::try_from(count).map_err(|_| {
                    PipelineError::invalid_parameter(key, "frame count cannot be negative")
                })?;
            }
            PARAM_FRAME_RATE => {
                let rate = expect_float(key, value)?;
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(PipelineError::invalid_parameter(key, "must be positive"));
                }
                self.frame_rate = rate;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Bytes in one RGB frame, or `None` when the size is unreasonable.
    fn frame_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|pixels| pixels.checked_mul(3))
            .filter(|len| *len <= MAX_FRAME_BYTES)
    }

    pub fn open(&mut self) -> PipelineResult<Option<TimeDomain>> {
        if self.frame_count == 0 {
            return Err(PipelineError::GraphFatal(
                "test pattern configured with zero frames".to_string(),
            ));
        }
        if self.frame_len().is_none() {
            return Err(PipelineError::GraphFatal(format!(
                "test pattern of {}x{} is too large",
                self.width, self.height
            )));
        }
        Ok(Some(TimeDomain::new(0, self.frame_count - 1)))
    }

    pub fn process(&mut self, frame_index: u64) -> PipelineResult<Frame> {
        if frame_index >= self.frame_count {
            return Err(PipelineError::frame(
                frame_index,
                format!("test pattern has {} frames", self.frame_count),
            ));
        }

        let len = self.frame_len().ok_or_else(|| {
            PipelineError::frame(
                frame_index,
                format!("test pattern of {}x{} is too large", self.width, self.height),
            )
        })?;
        let (w, h) = (self.width as usize, self.height as usize);
        let blue = (frame_index.wrapping_mul(16) % 256) as u8;
        let mut data = Vec::with_capacity(len);
        for y in 0..h {
            let green = (y * 255 / h.saturating_sub(1).max(1)) as u8;
            for x in 0..w {
                let red = (x * 255 / w.saturating_sub(1).max(1)) as u8;
                data.extend_from_slice(&[red, green, blue]);
            }
        }
        Frame::new(
            self.width,
            self.height,
            PixelFormat::Rgb8,
            self.frame_rate,
            data,
        )
    }
}

impl Default for TestPatternNode {
    fn default() -> Self {
        Self::new()
    }
}
