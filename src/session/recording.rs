//! Capture workflow layered on the playback engine.
//!
//! ```text
//!            arm(graph)            record()
//! Stopped ─────────────► Armed ─────────────► Recording
//!    ▲                     │                      │
//!    └─────────────────────┴──── stop_recording ──┘
//! ```
//!
//! Recording swaps the armed graph into the engine and remembers the graph
//! that was playing before. Stopping puts the previous graph and playhead
//! back.

use crate::engine::PlaybackEngine;
use crate::error::{KaliscopeError, Result, ResultExt};
use crate::pipeline::ProcessingGraph;
use std::fmt;
use std::sync::Arc;

/// Recording workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Stopped,
    /// A capture graph is waiting for `record()`.
    ArmedToRecord,
    Recording,
}

impl RecordingState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, RecordingState::Stopped)
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, RecordingState::ArmedToRecord)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, RecordingState::Recording)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RecordingState::Stopped => "Stopped",
            RecordingState::ArmedToRecord => "Armed to record",
            RecordingState::Recording => "Recording",
        }
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// What was playing before recording started.
struct PreviousPlayback {
    graph: Option<Arc<ProcessingGraph>>,
    position: u64,
    was_running: bool,
}

pub struct RecordingWorkflow {
    engine: Arc<PlaybackEngine>,
    state: RecordingState,
    armed: Option<Arc<ProcessingGraph>>,
    previous: Option<PreviousPlayback>,
    continuous: bool,
}

impl RecordingWorkflow {
    /// A stopped workflow driving `engine`. Capture is frame by frame until
    /// [`set_continuous`](Self::set_continuous) says otherwise.
    pub fn new(engine: Arc<PlaybackEngine>) -> Self {
        Self {
            engine,
            state: RecordingState::Stopped,
            armed: None,
            previous: None,
            continuous: false,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn engine(&self) -> &Arc<PlaybackEngine> {
        &self.engine
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    /// Graph waiting to be recorded with.
    pub fn armed_graph(&self) -> Option<&Arc<ProcessingGraph>> {
        self.armed.as_ref()
    }

    /// Prepare `graph` for capture. Re-arming replaces the waiting graph.
    ///
    /// # Errors
    /// `Engine` while recording.
    pub fn arm(&mut self, graph: Arc<ProcessingGraph>) -> Result<()> {
        if self.state.is_recording() {
            return Err(KaliscopeError::Engine(
                "cannot arm while recording".to_string(),
            ));
        }
        tracing::info!("Armed graph {} for recording", graph.id());
        self.armed = Some(graph);
        self.state = RecordingState::ArmedToRecord;
        Ok(())
    }

    /// Swap the armed graph into the engine and start capturing from its
    /// first frame.
    ///
    /// On failure the previous graph is put back and the workflow stays armed.
    pub fn record(&mut self) -> Result<()> {
        if !self.state.is_armed() {
            return Err(KaliscopeError::Engine(format!(
                "cannot record from state {}",
                self.state
            )));
        }
        let Some(graph) = self.armed.take() else {
            return Err(KaliscopeError::Engine("no graph armed".to_string()));
        };

        let was_running = self.engine.is_running();
        let position = self.engine.position();
        self.engine.stop();

        let previous = self.engine.set_processing_graph(Arc::clone(&graph));
        self.engine.seek(0);
        self.engine.set_frame_stepping(!self.continuous);

        if let Err(e) = self.engine.start().context("Failed to start recording") {
            tracing::error!("{}", e);
            self.restore(PreviousPlayback {
                graph: previous,
                position,
                was_running,
            });
            self.armed = Some(graph);
            return Err(e);
        }

        self.previous = Some(PreviousPlayback {
            graph: previous,
            position,
            was_running,
        });
        self.state = RecordingState::Recording;
        tracing::info!(
            "Recording with graph {} ({})",
            graph.id(),
            if self.continuous { "continuous" } else { "frame by frame" }
        );
        Ok(())
    }

    /// Capture one more frame in frame-by-frame mode.
    pub fn capture_next_frame(&self) -> Result<()> {
        if !self.state.is_recording() {
            return Err(KaliscopeError::Engine("not recording".to_string()));
        }
        self.engine.process_next_frame();
        Ok(())
    }

    /// Switch between continuous and frame-by-frame capture. Applies
    /// immediately while recording.
    pub fn set_continuous(&mut self, continuous: bool) {
        self.continuous = continuous;
        if self.state.is_recording() {
            self.engine.set_frame_stepping(!continuous);
        }
    }

    /// Stop capturing and give the engine back its previous graph.
    ///
    /// From the armed state this only disarms. Stopping when stopped does
    /// nothing.
    pub fn stop_recording(&mut self) {
        match self.state {
            RecordingState::Stopped => {}
            RecordingState::ArmedToRecord => {
                self.armed = None;
                tracing::info!("Recording disarmed");
            }
            RecordingState::Recording => {
                self.engine.stop();
                if let Some(previous) = self.previous.take() {
                    self.restore(previous);
                }
                tracing::info!("Recording stopped");
            }
        }
        self.state = RecordingState::Stopped;
    }

    fn restore(&self, previous: PreviousPlayback) {
        let has_graph = match previous.graph {
            Some(graph) => {
                self.engine.set_processing_graph(graph);
                true
            }
            None => {
                self.engine.clear_processing_graph();
                false
            }
        };
        self.engine.set_frame_stepping(false);
        self.engine.seek(previous.position);

        if previous.was_running && has_graph {
            if let Err(e) = self.engine.start() {
                tracing::warn!("Could not resume playback: {}", e);
            }
        }
    }
}

impl Drop for RecordingWorkflow {
    fn drop(&mut self) {
        if self.state.is_recording() {
            self.stop_recording();
        }
    }
}

impl fmt::Debug for RecordingWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingWorkflow")
            .field("state", &self.state)
            .field("continuous", &self.continuous)
            .field("armed", &self.armed.as_ref().map(|g| g.id()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, SettingsTree};
    use crate::engine::FrameEvent;
    use crate::pipeline::nodes::TEST_PATTERN_ID;
    use crate::pipeline::{GraphBuilder, PipelineModel, PluginRegistry};
    use std::time::Duration;

    fn graph(frames: i64) -> Arc<ProcessingGraph> {
        let mut params = SettingsTree::new();
        params.insert("Frame count", frames);
        let mut model = PipelineModel::new();
        model.push(TEST_PATTERN_ID, params);
        Arc::new(
            GraphBuilder::new(Arc::new(PluginRegistry::with_builtins()))
                .build(&model)
                .unwrap(),
        )
    }

    fn engine() -> Arc<PlaybackEngine> {
        Arc::new(PlaybackEngine::new(
            EngineConfig::default().with_max_frames_in_flight(0),
        ))
    }

    #[test]
    fn test_record_requires_arm() {
        let mut workflow = RecordingWorkflow::new(engine());
        assert!(workflow.record().is_err());
        assert!(workflow.capture_next_frame().is_err());
        assert!(workflow.state().is_stopped());
    }

    #[test]
    fn test_disarm_keeps_engine_untouched() {
        let engine = engine();
        let preview = graph(10);
        engine.set_processing_graph(preview.clone());

        let mut workflow = RecordingWorkflow::new(engine.clone());
        workflow.arm(graph(3)).unwrap();
        assert!(workflow.state().is_armed());
        workflow.stop_recording();

        assert!(workflow.state().is_stopped());
        assert!(workflow.armed_graph().is_none());
        assert_eq!(engine.active_graph().unwrap().id(), preview.id());
    }

    #[test]
    fn test_record_then_stop_restores_preview() {
        let engine = engine();
        let preview = graph(10);
        engine.set_processing_graph(preview.clone());
        engine.seek(7);

        let capture = graph(3);
        let sub = engine.subscribe();
        let mut workflow = RecordingWorkflow::new(engine.clone());
        workflow.arm(capture.clone()).unwrap();
        workflow.record().unwrap();
        assert!(workflow.state().is_recording());
        assert_eq!(engine.active_graph().unwrap().id(), capture.id());
        assert!(workflow.arm(graph(1)).is_err());

        workflow.capture_next_frame().unwrap();
        match sub.recv_timeout(Duration::from_secs(5)).unwrap() {
            FrameEvent::FrameReady { index, .. } => assert_eq!(index, 0),
            other => panic!("unexpected event {:?}", other),
        }

        workflow.stop_recording();
        assert!(workflow.state().is_stopped());
        assert_eq!(engine.active_graph().unwrap().id(), preview.id());
        assert_eq!(engine.position(), 7);
        assert!(!engine.is_running());
    }

    #[test]
    fn test_set_continuous_switches_engine_mode() {
        let engine = engine();
        let mut workflow = RecordingWorkflow::new(engine.clone());
        workflow.arm(graph(1_000)).unwrap();
        workflow.record().unwrap();
        assert_eq!(engine.mode(), crate::engine::PlaybackMode::Stepping);

        workflow.set_continuous(true);
        assert_eq!(engine.mode(), crate::engine::PlaybackMode::Continuous);
        workflow.stop_recording();
        assert!(engine.active_graph().is_none());
    }
}
