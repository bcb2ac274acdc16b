//! ColorNegInvertNode: orange mask removal for colour negative scans.
//!
//! Each colour channel is scaled so that the film base colour (the "filter
//! colour") maps to the maximum channel value, then multiplied by a
//! per-channel contrast factor and optionally inverted:
//!
//! ```text
//! out = clamp(in * max / filter * factor / 100, 0, max)
//! out = max - out            (when "Invert colors" is set)
//! ```
//!
//! The same node backs two plugins: the negative inverter and the mask
//! remover, which differ only in how the factor parameters are named.

use super::{
    expect_bool, expect_float, expect_int, COLOR_MASK_REMOVER_ID, COLOR_NEG_INVERT_ID,
};
use crate::config::ConfigValue;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::frame::{Frame, PixelFormat};
use crate::pipeline::host::{PluginDescriptor, PluginKind};

pub const PARAM_RED_FILTER: &str = "Red filter color";
pub const PARAM_GREEN_FILTER: &str = "Green filter color";
pub const PARAM_BLUE_FILTER: &str = "Blue filter color";
pub const PARAM_MAXIMUM_VALUE: &str = "Maximum channel value";
pub const PARAM_INVERT: &str = "Invert colors";

const CONTRAST_KEYS: [&str; 3] = [
    "Red channel contrast (%)",
    "Green channel contrast (%)",
    "Blue channel contrast (%)",
];
const MASK_FACTOR_KEYS: [&str; 3] = [
    "Red channel factor (%)",
    "Green channel factor (%)",
    "Blue channel factor (%)",
];
const FILTER_KEYS: [&str; 3] = [PARAM_RED_FILTER, PARAM_GREEN_FILTER, PARAM_BLUE_FILTER];

const DEFAULT_FILTER: [u16; 3] = [247, 133, 78];
const DEFAULT_FACTOR: f64 = 100.0;
const DEFAULT_MAXIMUM_VALUE: u16 = 255;

pub struct ColorNegInvertNode {
    identifier: &'static str,
    factor_keys: [&'static str; 3],
    filter: [u16; 3],
    factor: [f64; 3],
    maximum: u16,
    invert: bool,
}

impl ColorNegInvertNode {
    /// Negative inverter (`Invert colors` defaults to off, as in the film plugin).
    pub fn new() -> Self {
        Self::with_keys(COLOR_NEG_INVERT_ID, CONTRAST_KEYS)
    }

    /// Orange mask remover.
    pub fn mask_remover() -> Self {
        Self::with_keys(COLOR_MASK_REMOVER_ID, MASK_FACTOR_KEYS)
    }

    fn with_keys(identifier: &'static str, factor_keys: [&'static str; 3]) -> Self {
        Self {
            identifier,
            factor_keys,
            filter: DEFAULT_FILTER,
            factor: [DEFAULT_FACTOR; 3],
            maximum: DEFAULT_MAXIMUM_VALUE,
            invert: false,
        }
    }

    pub fn descriptor() -> PluginDescriptor {
        Self::describe(
            PluginDescriptor::new(COLOR_NEG_INVERT_ID, "Color negative invert", PluginKind::Effect),
            CONTRAST_KEYS,
        )
    }

    pub fn mask_remover_descriptor() -> PluginDescriptor {
        Self::describe(
            PluginDescriptor::new(COLOR_MASK_REMOVER_ID, "Color mask remover", PluginKind::Effect),
            MASK_FACTOR_KEYS,
        )
    }

    fn describe(mut descriptor: PluginDescriptor, factor_keys: [&str; 3]) -> PluginDescriptor {
        descriptor = descriptor.with_parameter(PARAM_MAXIMUM_VALUE, DEFAULT_MAXIMUM_VALUE as i64);
        for (key, default) in FILTER_KEYS.iter().zip(DEFAULT_FILTER) {
            descriptor = descriptor.with_parameter(*key, default as i64);
        }
        for key in factor_keys {
            descriptor = descriptor.with_parameter(key, DEFAULT_FACTOR);
        }
        descriptor.with_parameter(PARAM_INVERT, false)
    }

    pub fn identifier(&self) -> &str {
        self.identifier
    }

    pub fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        if key == PARAM_MAXIMUM_VALUE {
            self.maximum = channel_value(key, value)?;
            return Ok(true);
        }
        if key == PARAM_INVERT {
            self.invert = expect_bool(key, value)?;
            return Ok(true);
        }
        if let Some(channel) = FILTER_KEYS.iter().position(|k| *k == key) {
            self.filter[channel] = channel_value(key, value)?;
            return Ok(true);
        }
        if let Some(channel) = self.factor_keys.iter().position(|k| *k == key) {
            let factor = expect_float(key, value)?;
            if !factor.is_finite() || factor < 0.0 {
                return Err(PipelineError::invalid_parameter(key, "must be a non-negative percentage"));
            }
            self.factor[channel] = factor;
            return Ok(true);
        }
        Ok(false)
    }

    /// Map one 8-bit input value of `channel` through the correction.
    pub fn correct(&self, channel: usize, value: u8) -> u8 {
        let max = f64::from(self.maximum);
        let scaled = f64::from(value) * max / f64::from(self.filter[channel]) * self.factor[channel]
            / 100.0;
        let mut out = scaled.clamp(0.0, max);
        if self.invert {
            out = max - out;
        }
        out.round().clamp(0.0, 255.0) as u8
    }

    pub fn process(&mut self, frame_index: u64, input: Option<&Frame>) -> PipelineResult<Frame> {
        let input = input.ok_or_else(|| PipelineError::frame(frame_index, "no input frame"))?;

        let luts: Vec<[u8; 256]> = (0..3)
            .map(|channel| {
                let mut lut = [0u8; 256];
                for (v, slot) in lut.iter_mut().enumerate() {
                    *slot = self.correct(channel, v as u8);
                }
                lut
            })
            .collect();

        let channels = input.format().channels();
        let colour_channels = match input.format() {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => 3,
        };

        let mut data = input.data().to_vec();
        for pixel in data.chunks_exact_mut(channels) {
            for (channel, value) in pixel.iter_mut().take(colour_channels).enumerate() {
                *value = luts[channel][*value as usize];
            }
        }
        input.with_data(data)
    }
}

impl Default for ColorNegInvertNode {
    fn default() -> Self {
        Self::new()
    }
}

fn channel_value(key: &str, value: &ConfigValue) -> PipelineResult<u16> {
    let v = expect_int(key, value)?;
    u16::try_from(v)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| PipelineError::invalid_parameter(key, format!("{} is not a channel value", v)))
}
