//! Error handling for kaliscope-rs
//!
//! This module defines the crate-level error type and a Result alias. Errors
//! raised inside the processing pipeline live in [`crate::pipeline::PipelineError`]
//! and convert into [`KaliscopeError`] with `?`.

use crate::pipeline::PipelineError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for kaliscope-rs operations
#[derive(Error, Debug)]
pub enum KaliscopeError {
    /// A settings file could not be read, parsed or written
    #[error("Persistence error for {path:?}: {message}")]
    Persistence { path: PathBuf, message: String },

    /// Errors raised by the processing pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to the playback engine lifecycle
    #[error("Engine error: {0}")]
    Engine(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<KaliscopeError>,
    },
}

impl KaliscopeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        KaliscopeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build a persistence error for `path`
    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        KaliscopeError::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for kaliscope-rs operations
pub type Result<T> = std::result::Result<T, KaliscopeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KaliscopeError::Engine("no processing graph installed".to_string());
        assert_eq!(err.to_string(), "Engine error: no processing graph installed");
    }

    #[test]
    fn test_error_with_context() {
        let err = KaliscopeError::Config("bad value".to_string());
        let with_ctx = err.with_context("Failed to load engine config");
        assert!(with_ctx.to_string().contains("Failed to load engine config"));
    }

    #[test]
    fn test_persistence_error_mentions_path() {
        let err = KaliscopeError::persistence("/tmp/pipeline.xml", "unsupported extension");
        assert!(err.to_string().contains("pipeline.xml"));
        assert!(err.to_string().contains("unsupported extension"));
    }

    #[test]
    fn test_pipeline_error_converts() {
        let err: KaliscopeError = PipelineError::PluginNotFound("acme.blur".to_string()).into();
        assert!(matches!(err, KaliscopeError::Pipeline(_)));
        assert!(err.to_string().contains("acme.blur"));
    }
}
