//! Linear processing graph built from a pipeline model.
//!
//! ```text
//! [reader] ──► [effect] ──► ... ──► [writer]
//! ```
//!
//! A graph is immutable once built. Its nodes sit behind one mutex that is
//! held for the whole of a frame, so a frame is always rendered by a single
//! consistent chain even when another thread swaps graphs in the engine.
//!
//! A graph the engine has swapped out is *retired*: its cached frames are
//! dropped and a frame still in flight on it is not cached.

use crate::pipeline::cache::FrameCache;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::frame::{Frame, TimeDomain};
use crate::pipeline::host::PluginKind;
use crate::pipeline::id::{GraphId, NodeId};
use crate::pipeline::node::AnyNode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// A resolved node and the role its plugin declared.
#[derive(Debug)]
pub struct GraphNode {
    pub id: NodeId,
    pub identifier: String,
    pub kind: PluginKind,
    pub node: AnyNode,
}

/// A pipeline instance left out of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedInstance {
    pub position: usize,
    pub plugin_identifier: String,
    pub reason: String,
}

#[derive(Debug)]
struct GraphState {
    nodes: Vec<GraphNode>,
    time_domain: Option<TimeDomain>,
}

#[derive(Debug)]
pub struct ProcessingGraph {
    id: GraphId,
    state: Mutex<GraphState>,
    identifiers: Vec<String>,
    reader: NodeId,
    writer: Option<NodeId>,
    cache: Arc<FrameCache>,
    retired: AtomicBool,
    skipped: Vec<SkippedInstance>,
}

impl ProcessingGraph {
    /// Assemble a graph from already-resolved nodes.
    ///
    /// The first node is the reader; `writer` must index into `nodes`.
    pub(crate) fn new(
        nodes: Vec<GraphNode>,
        writer: Option<NodeId>,
        cache: Arc<FrameCache>,
        skipped: Vec<SkippedInstance>,
    ) -> Self {
        let identifiers = nodes.iter().map(|n| n.identifier.clone()).collect();
        Self {
            id: GraphId::next(),
            state: Mutex::new(GraphState {
                nodes,
                time_domain: None,
            }),
            identifiers,
            reader: NodeId(0),
            writer,
            cache,
            retired: AtomicBool::new(false),
            skipped,
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn reader(&self) -> NodeId {
        self.reader
    }

    pub fn writer(&self) -> Option<NodeId> {
        self.writer
    }

    /// Plugin identifiers of the resolved nodes, in chain order.
    pub fn node_identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn cache(&self) -> &Arc<FrameCache> {
        &self.cache
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Stop caching for this graph and drop its cached frames.
    ///
    /// Returns the number of frames removed.
    pub fn retire(&self) -> usize {
        self.retired.store(true, Ordering::SeqCst);
        self.cache.invalidate_graph(self.id)
    }

    /// Undo [`retire`](Self::retire) when the graph is installed again.
    pub fn reinstate(&self) {
        self.retired.store(false, Ordering::SeqCst);
    }

    /// Instances that could not be resolved or instantiated.
    pub fn skipped(&self) -> &[SkippedInstance] {
        &self.skipped
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_open(&self) -> bool {
        self.lock().time_domain.is_some()
    }

    /// Range reported by the reader, once the graph is open.
    pub fn time_domain(&self) -> Option<TimeDomain> {
        self.lock().time_domain
    }

    /// Open every node and return the reader's time domain.
    ///
    /// Readers that do not report a range are treated as unbounded. Opening
    /// an already open graph returns the stored range. Any failure closes
    /// the nodes opened so far and is reported as `GraphFatal`.
    pub fn open(&self) -> PipelineResult<TimeDomain> {
        let mut state = self.lock();
        if let Some(domain) = state.time_domain {
            return Ok(domain);
        }

        let mut domain = TimeDomain::new(0, u64::MAX);
        for i in 0..state.nodes.len() {
            match state.nodes[i].node.open() {
                Ok(Some(reported)) if i == self.reader.index() => domain = reported,
                Ok(_) => {}
                Err(e) => {
                    let failed = state.nodes[i].identifier.clone();
                    for opened in state.nodes[..i].iter_mut() {
                        opened.node.close();
                    }
                    return Err(match e {
                        PipelineError::GraphFatal(msg) => PipelineError::GraphFatal(msg),
                        other => PipelineError::GraphFatal(format!("{}: {}", failed, other)),
                    });
                }
            }
        }

        state.time_domain = Some(domain);
        tracing::info!(
            "Opened graph {} over frames {}..={}",
            self.id,
            domain.first,
            domain.last
        );
        Ok(domain)
    }

    /// Render the frame at `frame_index`.
    ///
    /// A cached frame skips the chain, but the writer still receives it.
    /// When effects follow the writer the chain always runs, since the cached
    /// output is not what the writer consumes.
    pub fn compute_frame(&self, frame_index: u64) -> PipelineResult<Frame> {
        let mut state = self.lock();
        if state.time_domain.is_none() {
            return Err(PipelineError::GraphFatal(format!(
                "graph {} used before open",
                self.id
            )));
        }

        let last = state.nodes.len().saturating_sub(1);
        let cacheable = self.writer.map_or(true, |w| w.index() == last) && !self.is_retired();

        if cacheable {
            if let Some(frame) = self.cache.get(self.id, frame_index) {
                tracing::trace!("Cache hit for frame {} of graph {}", frame_index, self.id);
                if let Some(writer) = self.writer {
                    let node = &mut state.nodes[writer.index()];
                    node.node
                        .process(frame_index, Some(&frame))
                        .map_err(|e| as_frame_error(frame_index, &node.identifier, e))?;
                }
                return Ok(frame);
            }
        }

        let mut current: Option<Frame> = None;
        for node in state.nodes.iter_mut() {
            let output = node
                .node
                .process(frame_index, current.as_ref())
                .map_err(|e| as_frame_error(frame_index, &node.identifier, e))?;
            current = Some(output);
        }

        let frame = current.ok_or_else(|| {
            PipelineError::GraphFatal(format!("graph {} has no nodes", self.id))
        })?;
        if cacheable {
            self.cache.put(self.id, frame_index, frame.clone());
            // Retired while rendering; `retire` may have run before the put.
            if self.is_retired() {
                self.cache.remove(self.id, frame_index);
            }
        }
        Ok(frame)
    }

    /// Close every node. The graph can be opened again afterwards.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.time_domain.take().is_some() {
            for node in state.nodes.iter_mut() {
                node.node.close();
            }
            tracing::debug!("Closed graph {}", self.id);
        }
    }
}

impl Drop for ProcessingGraph {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if state.time_domain.take().is_some() {
            for node in state.nodes.iter_mut() {
                node.node.close();
            }
        }
    }
}

fn as_frame_error(frame_index: u64, identifier: &str, error: PipelineError) -> PipelineError {
    match error {
        PipelineError::GraphFatal(_) | PipelineError::FrameCompute { .. } => error,
        other => PipelineError::frame(frame_index, format!("{}: {}", identifier, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::nodes::{
        ColorNegInvertNode, TestPatternNode, COLOR_NEG_INVERT_ID, TEST_PATTERN_ID,
    };

    fn chain() -> ProcessingGraph {
        let nodes = vec![
            GraphNode {
                id: NodeId(0),
                identifier: TEST_PATTERN_ID.to_string(),
                kind: PluginKind::Reader,
                node: TestPatternNode::new().into(),
            },
            GraphNode {
                id: NodeId(1),
                identifier: COLOR_NEG_INVERT_ID.to_string(),
                kind: PluginKind::Effect,
                node: ColorNegInvertNode::new().into(),
            },
        ];
        ProcessingGraph::new(nodes, None, Arc::new(FrameCache::new(8)), Vec::new())
    }

    #[test]
    fn test_compute_requires_open() {
        let graph = chain();
        assert!(graph.compute_frame(0).unwrap_err().is_fatal());
        let domain = graph.open().unwrap();
        assert_eq!(domain.first, 0);
        assert!(graph.compute_frame(0).is_ok());
    }

    #[test]
    fn test_second_compute_hits_cache() {
        let graph = chain();
        graph.open().unwrap();
        let first = graph.compute_frame(2).unwrap();
        let second = graph.compute_frame(2).unwrap();
        assert!(first.shares_pixels(&second));
        assert_eq!(graph.cache().stats().hits, 1);
    }

    #[test]
    fn test_out_of_range_frame_is_frame_error() {
        let graph = chain();
        graph.open().unwrap();
        let err = graph.compute_frame(1_000).unwrap_err();
        assert!(matches!(err, PipelineError::FrameCompute { index: 1_000, .. }));
    }

    #[test]
    fn test_ids_differ_between_graphs() {
        assert_ne!(chain().id(), chain().id());
    }

    #[test]
    fn test_retired_graph_does_not_cache() {
        let graph = chain();
        graph.open().unwrap();
        graph.compute_frame(1).unwrap();
        assert_eq!(graph.retire(), 1);

        graph.compute_frame(1).unwrap();
        graph.compute_frame(2).unwrap();
        assert!(graph.cache().is_empty());
        assert_eq!(graph.cache().stats().hits, 0);

        graph.reinstate();
        graph.compute_frame(2).unwrap();
        assert!(graph.cache().contains(graph.id(), 2));
    }

    #[test]
    fn test_close_then_reopen() {
        let graph = chain();
        graph.open().unwrap();
        graph.close();
        assert!(!graph.is_open());
        assert!(graph.open().is_ok());
    }
}
