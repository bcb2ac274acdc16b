//! Pipeline-specific error types.

use thiserror::Error;

/// Errors that can occur within the pipeline system.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The plugin host does not know this identifier.
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// The model cannot be turned into a runnable graph.
    #[error("Graph build error: {0}")]
    GraphBuild(String),

    /// A single frame failed; playback may continue.
    #[error("Frame {index} failed: {message}")]
    FrameCompute { index: u64, message: String },

    /// The graph can no longer produce frames.
    #[error("Graph failure: {0}")]
    GraphFatal(String),

    /// A pipeline edit does not match the current model.
    #[error("Invalid pipeline edit: {0}")]
    InvalidEdit(String),

    #[error("Invalid parameter {key:?}: {message}")]
    InvalidParameter { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn frame(index: u64, message: impl Into<String>) -> Self {
        PipelineError::FrameCompute {
            index,
            message: message.into(),
        }
    }

    pub fn invalid_parameter(key: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::InvalidParameter {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether the worker must stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::GraphFatal(_))
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_display() {
        let err = PipelineError::frame(7, "missing file");
        assert_eq!(err.to_string(), "Frame 7 failed: missing file");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PipelineError::GraphFatal("reader closed".into()).is_fatal());
        assert!(!PipelineError::PluginNotFound("x".into()).is_fatal());
    }
}
