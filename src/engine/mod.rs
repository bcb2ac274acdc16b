//! Playback engine.
//!
//! The engine owns one [`ProcessingGraph`] at a time and drives it from a
//! dedicated worker thread, one frame index after another.
//!
//! # Threads
//!
//! ```text
//! controller threads                      worker thread
//! ──────────────────                      ─────────────
//! set_processing_graph ──► [graph slot] ──► read once per frame
//! process_next_frame   ──► [step tokens] ──► wait (stepping mode)
//! frame_processed      ──► [permits]     ◄── acquire before FrameReady
//! stop                 ──► [stop signal] ──► wakes every wait
//!                          [subscribers] ◄── FrameEvent per frame
//! ```
//!
//! All controller methods take `&self`; share the engine with `Arc` to drive
//! it from several threads.

mod worker;

use crate::config::EngineConfig;
use crate::error::{KaliscopeError, Result};
use crate::pipeline::{Frame, PipelineError, ProcessingGraph, TimeDomain};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use worker::PlaybackWorker;

/// Capacity of the internal wake channel used on mode changes.
const WAKE_CHANNEL_CAPACITY: usize = 1;

/// Name given to the worker thread.
const WORKER_THREAD_NAME: &str = "kaliscope-playback";

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

impl EngineState {
    pub fn is_idle(&self) -> bool {
        matches!(self, EngineState::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, EngineState::Starting | EngineState::Running)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EngineState::Idle => "Idle",
            EngineState::Starting => "Starting",
            EngineState::Running => "Running",
            EngineState::Stopping => "Stopping",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// How the worker advances while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// Produce frames back to back.
    #[default]
    Continuous,
    /// Produce one frame per `process_next_frame` call.
    Stepping,
}

/// Target of [`PlaybackEngine::seek_to`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekPosition {
    /// Absolute frame index.
    Frame(u64),
    /// Share of the reader's range, `0.0..=100.0`.
    Percent(f64),
    /// Offset from the first frame at the current frame rate.
    Millis(u64),
}

/// Notification delivered to subscribers.
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// A frame was rendered. Acknowledge it with `frame_processed`.
    FrameReady { index: u64, frame: Frame },
    /// A frame failed; playback continues with the next one.
    FrameError { index: u64, message: String },
    /// The reader has no more frames; the engine is back to idle.
    EndOfStream,
    /// The graph failed; the engine is back to idle.
    Fatal(String),
}

impl FrameEvent {
    pub fn index(&self) -> Option<u64> {
        match self {
            FrameEvent::FrameReady { index, .. } | FrameEvent::FrameError { index, .. } => {
                Some(*index)
            }
            FrameEvent::EndOfStream | FrameEvent::Fatal(_) => None,
        }
    }

    /// Whether the worker stops after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FrameEvent::EndOfStream | FrameEvent::Fatal(_))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

/// Receiving end of a frame subscription.
///
/// Dropping it unsubscribes at the next delivery.
#[derive(Debug)]
pub struct FrameSubscription {
    id: SubscriptionId,
    receiver: Receiver<FrameEvent>,
}

impl FrameSubscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn receiver(&self) -> &Receiver<FrameEvent> {
        &self.receiver
    }

    pub fn recv(&self) -> Option<FrameEvent> {
        self.receiver.recv().ok()
    }

    pub fn try_recv(&self) -> Option<FrameEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> std::result::Result<FrameEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

pub(crate) struct Subscriber {
    pub id: SubscriptionId,
    pub sender: Sender<FrameEvent>,
}

/// State shared between the controller and the worker.
pub(crate) struct EngineShared {
    pub config: EngineConfig,
    pub state: Mutex<EngineState>,
    pub mode: Mutex<PlaybackMode>,
    pub graph: Mutex<Option<Arc<ProcessingGraph>>>,
    pub position: AtomicU64,
    /// `f64` bits of the rate of the last rendered frame.
    pub frame_rate: AtomicU64,
    pub subscribers: Mutex<Vec<Subscriber>>,
    pub last_error: Mutex<Option<PipelineError>>,
    pub step_tx: Sender<()>,
    pub step_rx: Receiver<()>,
    pub wake_tx: Sender<()>,
    pub wake_rx: Receiver<()>,
    /// Present when backpressure is enabled; holds one message per
    /// unacknowledged frame.
    pub permits: Option<(Sender<()>, Receiver<()>)>,
}

// Lock poisoning is ignored throughout the engine.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl EngineShared {
    pub fn set_state(&self, state: EngineState) {
        let mut current = lock(&self.state);
        if *current != state {
            tracing::debug!("Engine state {} -> {}", *current, state);
            *current = state;
        }
    }

    pub fn store_error(&self, error: PipelineError) {
        *lock(&self.last_error) = Some(error);
    }

    pub fn frame_rate(&self) -> f64 {
        f64::from_bits(self.frame_rate.load(Ordering::Relaxed))
    }

    pub fn record_frame_rate(&self, rate: f64) {
        if rate.is_finite() && rate > 0.0 {
            self.frame_rate.store(rate.to_bits(), Ordering::Relaxed);
        }
    }
}

#[derive(Default)]
struct WorkerControl {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// Frame-accurate playback engine.
pub struct PlaybackEngine {
    shared: Arc<EngineShared>,
    control: Mutex<WorkerControl>,
    next_subscription: AtomicU64,
}

impl PlaybackEngine {
    pub fn new(config: EngineConfig) -> Self {
        let (step_tx, step_rx) = unbounded();
        let (wake_tx, wake_rx) = bounded(WAKE_CHANNEL_CAPACITY);
        let permits = (config.max_frames_in_flight > 0).then(|| bounded(config.max_frames_in_flight));
        let frame_rate = AtomicU64::new(config.default_frame_rate.to_bits());

        Self {
            shared: Arc::new(EngineShared {
                config,
                state: Mutex::new(EngineState::Idle),
                mode: Mutex::new(PlaybackMode::Continuous),
                graph: Mutex::new(None),
                position: AtomicU64::new(0),
                frame_rate,
                subscribers: Mutex::new(Vec::new()),
                last_error: Mutex::new(None),
                step_tx,
                step_rx,
                wake_tx,
                wake_rx,
                permits,
            }),
            control: Mutex::new(WorkerControl::default()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    // ── Graph ──

    /// Install `graph`; the worker picks it up at the next frame boundary.
    ///
    /// The replaced graph is retired: its cached frames are invalidated and
    /// a frame still rendering on it is not cached. Returns the previous
    /// graph.
    pub fn set_processing_graph(&self, graph: Arc<ProcessingGraph>) -> Option<Arc<ProcessingGraph>> {
        let new_id = graph.id();
        graph.reinstate();
        let previous = lock(&self.shared.graph).replace(graph);
        if let Some(old) = &previous {
            if old.id() != new_id {
                old.retire();
            }
        }
        tracing::info!(
            "Processing graph set to {} (previous: {:?})",
            new_id,
            previous.as_ref().map(|g| g.id())
        );
        previous
    }

    /// Remove the active graph. A running worker reports `Fatal` at the next
    /// frame boundary.
    pub fn clear_processing_graph(&self) -> Option<Arc<ProcessingGraph>> {
        let previous = lock(&self.shared.graph).take();
        if let Some(old) = &previous {
            old.retire();
            tracing::info!("Processing graph {} cleared", old.id());
        }
        previous
    }

    pub fn active_graph(&self) -> Option<Arc<ProcessingGraph>> {
        lock(&self.shared.graph).clone()
    }

    // ── Lifecycle ──

    /// Spawn the worker. Does nothing when already running.
    ///
    /// # Errors
    /// `Engine` when no graph is installed or the thread cannot be spawned.
    pub fn start(&self) -> Result<()> {
        let mut control = lock(&self.control);
        if lock(&self.shared.state).is_running() {
            tracing::debug!("start() ignored, engine already running");
            return Ok(());
        }
        if lock(&self.shared.graph).is_none() {
            return Err(KaliscopeError::Engine(
                "no processing graph installed".to_string(),
            ));
        }

        // Reap a worker that ended on its own (end of stream or fatal error).
        // It may still be handing its last event to a full queue.
        control.stop_tx = None;
        if let Some(handle) = control.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Previous playback worker panicked");
            }
        }

        self.shared.set_state(EngineState::Starting);
        if let Some((_, permit_rx)) = &self.shared.permits {
            while permit_rx.try_recv().is_ok() {}
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let worker = PlaybackWorker::new(Arc::clone(&self.shared), stop_rx);

        self.shared.set_state(EngineState::Running);
        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(|e| {
                self.shared.set_state(EngineState::Idle);
                KaliscopeError::Engine(format!("failed to spawn playback worker: {}", e))
            })?;

        control.stop_tx = Some(stop_tx);
        control.handle = Some(handle);
        tracing::info!("Playback engine started");
        Ok(())
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Wakes the worker from any wait (step token, backpressure, subscriber
    /// hand-off). Safe to call from any thread, and when already idle.
    pub fn stop(&self) {
        let mut control = lock(&self.control);
        if lock(&self.shared.state).is_running() {
            self.shared.set_state(EngineState::Stopping);
        }

        // Dropping the sender disconnects the stop channel.
        control.stop_tx = None;
        if let Some(handle) = control.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Playback worker panicked");
            }
            tracing::info!("Playback engine stopped");
        }
        self.shared.set_state(EngineState::Idle);
    }

    pub fn state(&self) -> EngineState {
        *lock(&self.shared.state)
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    // ── Stepping ──

    pub fn mode(&self) -> PlaybackMode {
        *lock(&self.shared.mode)
    }

    /// Switch between stepping and continuous playback; takes effect at the
    /// next frame boundary.
    pub fn set_frame_stepping(&self, active: bool) {
        let mut mode = lock(&self.shared.mode);
        let new_mode = if active {
            PlaybackMode::Stepping
        } else {
            PlaybackMode::Continuous
        };
        if *mode == new_mode {
            return;
        }
        *mode = new_mode;
        if new_mode == PlaybackMode::Continuous {
            while self.shared.step_rx.try_recv().is_ok() {}
        }
        drop(mode);

        let _ = self.shared.wake_tx.try_send(());
        tracing::debug!("Playback mode set to {:?}", new_mode);
    }

    /// Allow one more frame in stepping mode. Calls accumulate; in
    /// continuous mode the token is discarded.
    pub fn process_next_frame(&self) {
        let mode = lock(&self.shared.mode);
        if *mode == PlaybackMode::Stepping {
            let _ = self.shared.step_tx.send(());
        } else {
            tracing::debug!("Step token discarded in continuous mode");
        }
    }

    /// Pending step tokens not yet consumed by the worker.
    pub fn pending_steps(&self) -> usize {
        self.shared.step_rx.len()
    }

    // ── Position ──

    /// Index of the next frame the worker will produce.
    pub fn position(&self) -> u64 {
        self.shared.position.load(Ordering::Acquire)
    }

    /// Make `frame` the next frame to produce.
    pub fn seek(&self, frame: u64) {
        self.shared.position.store(frame, Ordering::Release);
        tracing::debug!("Seek to frame {}", frame);
    }

    /// Seek by frame, percentage or time. Returns the frame seeked to.
    ///
    /// Percentages map onto the reader's range, `100.0` being its last
    /// frame. Times are converted with [`frame_rate`](Self::frame_rate).
    ///
    /// # Errors
    /// `Engine` for a percentage outside `0..=100`, or when a percentage or
    /// time needs the range and no graph is installed. `Pipeline` when the
    /// graph cannot be opened.
    pub fn seek_to(&self, position: SeekPosition) -> Result<u64> {
        let frame = match position {
            SeekPosition::Frame(frame) => frame,
            SeekPosition::Percent(percent) => {
                if !(0.0..=100.0).contains(&percent) {
                    return Err(KaliscopeError::Engine(format!(
                        "seek percentage {} is outside 0..=100",
                        percent
                    )));
                }
                let domain = self.time_domain()?;
                let span = domain.len().saturating_sub(1) as f64;
                domain.first.saturating_add((span * percent / 100.0).round() as u64)
            }
            SeekPosition::Millis(millis) => {
                let domain = self.time_domain()?;
                let offset = (millis as f64 * self.frame_rate() / 1000.0).floor() as u64;
                domain.first.saturating_add(offset)
            }
        };
        self.seek(frame);
        Ok(frame)
    }

    /// Range of the active graph, opening it if the worker has not yet.
    pub fn time_domain(&self) -> Result<TimeDomain> {
        let graph = self.active_graph().ok_or_else(|| {
            KaliscopeError::Engine("no processing graph installed".to_string())
        })?;
        Ok(graph.open()?)
    }

    /// Frames in the active graph's range.
    pub fn length(&self) -> Option<u64> {
        self.time_domain().ok().map(|domain| domain.len())
    }

    /// Play time of the active graph's range at the current frame rate.
    pub fn duration(&self) -> Option<Duration> {
        let frames = self.length()?;
        Duration::try_from_secs_f64(frames as f64 / self.frame_rate()).ok()
    }

    /// Rate of the last rendered frame, or the configured default before
    /// the first one.
    pub fn frame_rate(&self) -> f64 {
        self.shared.frame_rate()
    }

    // ── Consumers ──

    /// Acknowledge a `FrameReady`, releasing one backpressure slot.
    pub fn frame_processed(&self, frame_index: u64) {
        if let Some((_, permit_rx)) = &self.shared.permits {
            match permit_rx.try_recv() {
                Ok(()) => tracing::trace!("Frame {} acknowledged", frame_index),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    tracing::debug!("Frame {} acknowledged with no frame in flight", frame_index)
                }
            }
        }
    }

    /// Published frames not yet acknowledged.
    pub fn frames_in_flight(&self) -> usize {
        self.shared
            .permits
            .as_ref()
            .map_or(0, |(_, permit_rx)| permit_rx.len())
    }

    /// Register a new event queue.
    pub fn subscribe(&self) -> FrameSubscription {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = bounded(self.shared.config.subscriber_queue_capacity);
        lock(&self.shared.subscribers).push(Subscriber { id, sender });
        tracing::debug!("Added subscriber {:?}", id);
        FrameSubscription { id, receiver }
    }

    /// Remove a subscription. Returns false when it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.shared.subscribers);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        before != subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }

    /// Error that made the worker stop, if any. Clears it.
    pub fn take_last_error(&self) -> Option<PipelineError> {
        lock(&self.shared.last_error).take()
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("state", &self.state())
            .field("mode", &self.mode())
            .field("position", &self.position())
            .field("graph", &self.active_graph().map(|g| g.id()))
            .finish()
    }
}
