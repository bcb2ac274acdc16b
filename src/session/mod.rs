//! Capture sessions on top of the playback engine.
//!
//! [`RecordingWorkflow`] arms a capture graph, swaps it into the engine for
//! the duration of a recording and restores the preview afterwards.

pub mod recording;

pub use recording::{RecordingState, RecordingWorkflow};
