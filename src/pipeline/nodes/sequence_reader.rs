//! SequenceReaderNode: reads a numbered image sequence from a directory.
//!
//! Files with the configured extension are sorted by name; frame `n` is the
//! `n`-th file.

use super::{expect_float, expect_string, SEQUENCE_READER_ID};
use crate::config::ConfigValue;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::frame::{Frame, PixelFormat, TimeDomain};
use crate::pipeline::host::{PluginDescriptor, PluginKind};
use std::path::{Path, PathBuf};

pub const PARAM_DIRECTORY: &str = "Directory";
pub const PARAM_EXTENSION: &str = "Extension";
pub use super::PARAM_FRAME_RATE;

const DEFAULT_EXTENSION: &str = "png";

pub struct SequenceReaderNode {
    directory: PathBuf,
    extension: String,
    frame_rate: f64,
    files: Vec<PathBuf>,
}

impl SequenceReaderNode {
    pub fn new() -> Self {
        Self {
            directory: PathBuf::new(),
            extension: DEFAULT_EXTENSION.to_string(),
            frame_rate: crate::config::DEFAULT_FRAME_RATE,
            files: Vec::new(),
        }
    }

    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(SEQUENCE_READER_ID, "Image sequence reader", PluginKind::Reader)
            .with_parameter(PARAM_DIRECTORY, "")
            .with_parameter(PARAM_EXTENSION, DEFAULT_EXTENSION)
            .with_parameter(PARAM_FRAME_RATE, crate::config::DEFAULT_FRAME_RATE)
    }

    pub fn identifier(&self) -> &str {
        SEQUENCE_READER_ID
    }

    pub fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        match key {
            PARAM_DIRECTORY => self.directory = PathBuf::from(expect_string(key, value)?),
            PARAM_EXTENSION => {
                self.extension = expect_string(key, value)?
                    .trim_start_matches('.')
                    .to_ascii_lowercase()
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

    pub fn open(&mut self) -> PipelineResult<Option<TimeDomain>> {
        self.files = list_sequence(&self.directory, &self.extension).map_err(|e| {
            PipelineError::GraphFatal(format!(
                "cannot list sequence in {}: {}",
                self.directory.display(),
                e
            ))
        })?;

        if self.files.is_empty() {
            return Err(PipelineError::GraphFatal(format!(
                "no .{} files in {}",
                self.extension,
                self.directory.display()
            )));
        }

        tracing::debug!(
            "Opened sequence of {} frames in {}",
            self.files.len(),
            self.directory.display()
        );
        Ok(Some(TimeDomain::new(0, self.files.len() as u64 - 1)))
    }

    pub fn process(&mut self, frame_index: u64) -> PipelineResult<Frame> {
        let path = usize::try_from(frame_index)
            .ok()
            .and_then(|i| self.files.get(i))
            .ok_or_else(|| PipelineError::frame(frame_index, "frame outside the sequence"))?;

        let image = image::open(path).map_err(|e| {
            PipelineError::frame(frame_index, format!("{}: {}", path.display(), e))
        })?;

        let (width, height) = (image.width(), image.height());
        let (format, data) = match image {
            image::DynamicImage::ImageLuma8(buf) => (PixelFormat::Gray8, buf.into_raw()),
            image::DynamicImage::ImageRgba8(buf) => (PixelFormat::Rgba8, buf.into_raw()),
            other => (PixelFormat::Rgb8, other.into_rgb8().into_raw()),
        };
        Frame::new(width, height, format, self.frame_rate, data)
    }

    pub fn close(&mut self) {
        self.files.clear();
    }

    /// Files found by the last `open`, in frame order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl Default for SequenceReaderNode {
    fn default() -> Self {
        Self::new()
    }
}

fn list_sequence(directory: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(directory)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        })
        .collect();
    files.sort();
    Ok(files)
}
