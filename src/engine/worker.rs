use super::{lock, EngineShared, EngineState, FrameEvent, PlaybackMode, SubscriptionId};
use crate::pipeline::{PipelineError, ProcessingGraph};
use crossbeam_channel::{select, Receiver, Sender, TryRecvError};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Why the worker loop ended.
enum Exit {
    Stopped,
    EndOfStream,
    Fatal,
}

impl Exit {
    fn reason(&self) -> &'static str {
        match self {
            Exit::Stopped => "stopped",
            Exit::EndOfStream => "end of stream",
            Exit::Fatal => "fatal error",
        }
    }
}

pub(crate) struct PlaybackWorker {
    shared: Arc<EngineShared>,
    stop_rx: Receiver<()>,
    current: Option<Arc<ProcessingGraph>>,
}

impl PlaybackWorker {
    pub fn new(shared: Arc<EngineShared>, stop_rx: Receiver<()>) -> Self {
        Self {
            shared,
            stop_rx,
            current: None,
        }
    }

    /// Worker thread body.
    pub fn run(mut self) {
        tracing::info!("Playback thread started");

        let exit = self.run_loop();

        if let Some(graph) = self.current.take() {
            graph.close();
        }
        tracing::info!("Playback thread exiting ({})", exit.reason());
    }

    fn stop_requested(&self) -> bool {
        // The controller drops the sender to stop us.
        matches!(self.stop_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn run_loop(&mut self) -> Exit {
        loop {
            if self.stop_requested() {
                return Exit::Stopped;
            }
            if !self.wait_for_step() {
                return Exit::Stopped;
            }

            let graph = match self.acquire_graph() {
                Ok(graph) => graph,
                Err(e) => return self.fatal(e),
            };
            let domain = match graph.time_domain() {
                Some(domain) => domain,
                None => {
                    return self.fatal(PipelineError::GraphFatal(format!(
                        "graph {} is not open",
                        graph.id()
                    )))
                }
            };

            let mut index = self.shared.position.load(Ordering::Acquire);
            if index < domain.first {
                let _ = self.shared.position.compare_exchange(
                    index,
                    domain.first,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                index = domain.first;
            }
            if index > domain.last {
                tracing::info!("End of stream after frame {}", domain.last);
                // Idle before subscribers hear about it; `stop()` still reaps the thread.
                self.shared.set_state(EngineState::Idle);
                self.publish(FrameEvent::EndOfStream);
                return Exit::EndOfStream;
            }

            match graph.compute_frame(index) {
                Ok(frame) => {
                    if !self.acquire_permit() {
                        return Exit::Stopped;
                    }
                    self.shared.record_frame_rate(frame.frame_rate());
                    if !self.publish(FrameEvent::FrameReady { index, frame }) {
                        return Exit::Stopped;
                    }
                    self.advance(index);
                }
                Err(e) if e.is_fatal() => return self.fatal(e),
                Err(e) => {
                    tracing::warn!("Frame {} failed: {}", index, e);
                    if !self.publish(FrameEvent::FrameError {
                        index,
                        message: e.to_string(),
                    }) {
                        return Exit::Stopped;
                    }
                    self.advance(index);
                }
            }
        }
    }

    /// In stepping mode, block until a step token arrives. Returns false on
    /// stop.
    fn wait_for_step(&self) -> bool {
        loop {
            if *lock(&self.shared.mode) == PlaybackMode::Continuous {
                return true;
            }
            select! {
                recv(self.shared.step_rx) -> _ => return true,
                // Mode changed; check it again.
                recv(self.shared.wake_rx) -> _ => continue,
                recv(self.stop_rx) -> _ => return false,
            }
        }
    }

    /// Pick up the active graph, reopening when it changed since the last
    /// frame.
    fn acquire_graph(&mut self) -> Result<Arc<ProcessingGraph>, PipelineError> {
        let active = lock(&self.shared.graph)
            .clone()
            .ok_or_else(|| PipelineError::GraphFatal("no processing graph installed".to_string()))?;

        let changed = self
            .current
            .as_ref()
            .map_or(true, |current| !Arc::ptr_eq(current, &active));
        if changed {
            if let Some(old) = self.current.take() {
                tracing::debug!("Switching from graph {} to {}", old.id(), active.id());
                old.close();
            }
            active.open()?;
            self.current = Some(Arc::clone(&active));
        }
        Ok(active)
    }

    /// Take one backpressure slot. Returns false on stop.
    fn acquire_permit(&self) -> bool {
        let Some((permit_tx, _)) = &self.shared.permits else {
            return true;
        };
        if permit_tx.try_send(()).is_ok() {
            return true;
        }
        tracing::trace!("Waiting for a frame acknowledgement");
        select! {
            send(permit_tx, ()) -> res => res.is_ok(),
            recv(self.stop_rx) -> _ => false,
        }
    }

    /// Move to the frame after `index` unless someone seeked meanwhile.
    fn advance(&self, index: u64) {
        let _ = self.shared.position.compare_exchange(
            index,
            index.saturating_add(1),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Deliver `event` to every subscriber, blocking on full queues.
    ///
    /// Disconnected subscribers are dropped. Returns false on stop.
    fn publish(&self, event: FrameEvent) -> bool {
        let snapshot: Vec<(SubscriptionId, Sender<FrameEvent>)> = lock(&self.shared.subscribers)
            .iter()
            .map(|s| (s.id, s.sender.clone()))
            .collect();

        let mut gone = Vec::new();
        for (id, sender) in snapshot {
            select! {
                send(sender, event.clone()) -> res => {
                    if res.is_err() {
                        gone.push(id);
                    }
                }
                recv(self.stop_rx) -> _ => return false,
            }
        }

        if !gone.is_empty() {
            lock(&self.shared.subscribers).retain(|s| !gone.contains(&s.id));
            tracing::warn!("Removed {} disconnected subscribers", gone.len());
        }
        true
    }

    fn fatal(&self, error: PipelineError) -> Exit {
        tracing::error!("Playback stopped: {}", error);
        let message = error.to_string();
        self.shared.store_error(error);
        self.shared.set_state(EngineState::Idle);
        self.publish(FrameEvent::Fatal(message));
        Exit::Fatal
    }
}
