//! SequenceWriterNode: writes every frame it receives as a numbered image.
//!
//! Output files are named `<prefix><index:06>.<extension>` inside the output
//! directory. The frame is passed through unchanged.

use super::{expect_string, SEQUENCE_WRITER_ID};
use crate::config::ConfigValue;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::frame::{Frame, PixelFormat, TimeDomain};
use crate::pipeline::host::{PluginDescriptor, PluginKind};
use std::path::PathBuf;

pub const PARAM_OUTPUT_DIRECTORY: &str = "Output directory";
pub const PARAM_OUTPUT_PREFIX: &str = "Output prefix";
pub const PARAM_EXTENSION: &str = "Extension";

const DEFAULT_PREFIX: &str = "frame_";
const DEFAULT_EXTENSION: &str = "png";

pub struct SequenceWriterNode {
    directory: PathBuf,
    prefix: String,
    extension: String,
    frames_written: u64,
}

impl SequenceWriterNode {
    pub fn new() -> Self {
        Self {
            directory: PathBuf::new(),
            prefix: DEFAULT_PREFIX.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
            frames_written: 0,
        }
    }

    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(SEQUENCE_WRITER_ID, "Image sequence writer", PluginKind::Writer)
            .with_parameter(PARAM_OUTPUT_DIRECTORY, "")
            .with_parameter(PARAM_OUTPUT_PREFIX, DEFAULT_PREFIX)
            .with_parameter(PARAM_EXTENSION, DEFAULT_EXTENSION)
    }

    pub fn identifier(&self) -> &str {
        SEQUENCE_WRITER_ID
    }

    pub fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        match key {
            PARAM_OUTPUT_DIRECTORY => self.directory = PathBuf::from(expect_string(key, value)?),
            PARAM_OUTPUT_PREFIX => self.prefix = expect_string(key, value)?,
            PARAM_EXTENSION => {
                self.extension = expect_string(key, value)?
                    .trim_start_matches('.')
                    .to_ascii_lowercase()
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub fn open(&mut self) -> PipelineResult<Option<TimeDomain>> {
        if self.directory.as_os_str().is_empty() {
            return Err(PipelineError::GraphFatal(
                "sequence writer has no output directory".to_string(),
            ));
        }
        std::fs::create_dir_all(&self.directory).map_err(|e| {
            PipelineError::GraphFatal(format!(
                "cannot create {}: {}",
                self.directory.display(),
                e
            ))
        })?;
        self.frames_written = 0;
        Ok(None)
    }

    /// Path the frame at `frame_index` is written to.
    pub fn output_path(&self, frame_index: u64) -> PathBuf {
        self.directory
            .join(format!("{}{:06}.{}", self.prefix, frame_index, self.extension))
    }

    pub fn process(&mut self, frame_index: u64, input: Option<&Frame>) -> PipelineResult<Frame> {
        let frame = input.ok_or_else(|| PipelineError::frame(frame_index, "no input frame"))?;
        let color = match frame.format() {
            PixelFormat::Gray8 => image::ColorType::L8,
            PixelFormat::Rgb8 => image::ColorType::Rgb8,
            PixelFormat::Rgba8 => image::ColorType::Rgba8,
        };

        let path = self.output_path(frame_index);
        image::save_buffer(&path, frame.data(), frame.width(), frame.height(), color).map_err(
            |e| PipelineError::frame(frame_index, format!("{}: {}", path.display(), e)),
        )?;

        self.frames_written += 1;
        tracing::debug!("Wrote frame {} to {}", frame_index, path.display());
        Ok(frame.clone())
    }

    pub fn close(&mut self) {
        tracing::debug!(
            "Sequence writer closed after {} frames",
            self.frames_written
        );
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Default for SequenceWriterNode {
    fn default() -> Self {
        Self::new()
    }
}
