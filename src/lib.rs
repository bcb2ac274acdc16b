//! # Kaliscope-RS: Film-Scan Playback and Capture Engine
//!
//! Frame-accurate processing of scanned film: an editable pipeline of
//! plugins (reader, effects, writer) is compiled into a processing graph and
//! driven frame by frame by a playback engine on its own worker thread.
//!
//! ## Architecture
//!
//! - **Config**: Hierarchical settings trees, engine tuning and app state
//! - **Pipeline**: Pipeline model, documents, presets, plugin host, graphs and
//!   the frame cache
//! - **Engine**: Worker thread with continuous and stepping playback,
//!   backpressure and frame subscribers
//! - **Session**: Recording workflow on top of the engine
//! - **Communication**: Crossbeam channels between controller and worker
//!
//! ## Configuration
//!
//! Application state (engine tuning, recent pipelines) is stored in the
//! platform-appropriate data directory under `dev.hxyulin.kaliscope-rs`:
//!
//! - **Linux**: `~/.local/share/dev.hxyulin.kaliscope-rs/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.kaliscope-rs/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.kaliscope-rs\`
//!
//! The default pipeline lives in `~/.kaliscope_pipeline.json`.
//!
//! ## Example
//!
//! ```no_run
//! use kaliscope_rs::{
//!     config::AppConfig,
//!     engine::{FrameEvent, PlaybackEngine},
//!     pipeline::{GraphBuilder, PipelineDocument, PluginRegistry},
//! };
//! use std::sync::Arc;
//!
//! fn main() -> kaliscope_rs::Result<()> {
//!     let config = AppConfig::load_or_default();
//!     let host = Arc::new(PluginRegistry::with_builtins());
//!
//!     let mut document = PipelineDocument::new(host.clone());
//!     document.load_default()?;
//!
//!     let graph = GraphBuilder::new(host)
//!         .with_config(&config.engine)
//!         .build(document.model())?;
//!
//!     let engine = PlaybackEngine::new(config.engine.clone());
//!     engine.set_processing_graph(Arc::new(graph));
//!     let frames = engine.subscribe();
//!     engine.start()?;
//!
//!     while let Some(event) = frames.recv() {
//!         match event {
//!             FrameEvent::FrameReady { index, .. } => engine.frame_processed(index),
//!             FrameEvent::FrameError { .. } => {}
//!             FrameEvent::EndOfStream | FrameEvent::Fatal(_) => break,
//!         }
//!     }
//!     engine.stop();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod session;

// Re-export commonly used types
pub use config::{AppConfig, ConfigValue, EngineConfig, SettingsTree};
pub use engine::{
    EngineState, FrameEvent, FrameSubscription, PlaybackEngine, PlaybackMode, SeekPosition,
};
pub use error::{KaliscopeError, Result};
pub use pipeline::{
    Frame, GraphBuilder, PipelineDocument, PipelineModel, PluginHost, PluginRegistry,
    ProcessingGraph,
};
pub use session::{RecordingState, RecordingWorkflow};
