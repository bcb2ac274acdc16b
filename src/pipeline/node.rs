//! Node abstraction for the processing graph.
//!
//! Two-layer design:
//! - **`EffectNode` trait**: for nodes supplied by an external plugin host.
//! - **`BuiltinNode` enum**: for the nodes shipped with the crate. Match arms
//!   inline, so the per-frame path avoids dynamic dispatch.
//!
//! `AnyNode` wraps either variant so the graph can handle both uniformly.
//!
//! Every node sees one frame index at a time. Readers receive no input and
//! produce the frame; effects and writers receive the upstream frame.

use crate::config::ConfigValue;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::frame::{Frame, TimeDomain};
use crate::pipeline::nodes::{
    ColorNegInvertNode, SequenceReaderNode, SequenceWriterNode, TestPatternNode,
};

/// Trait for nodes provided by a plugin host.
pub trait EffectNode: Send {
    /// Plugin identifier this node was instantiated from.
    fn identifier(&self) -> &str;

    /// Apply one parameter. Returns `Ok(false)` for keys the node ignores.
    fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool>;

    /// Prepare for rendering. Readers report the frames they can produce.
    fn open(&mut self) -> PipelineResult<Option<TimeDomain>> {
        Ok(None)
    }

    /// Produce the frame at `frame_index`.
    fn process(&mut self, frame_index: u64, input: Option<&Frame>) -> PipelineResult<Frame>;

    /// Release resources acquired in `open`.
    fn close(&mut self) {}
}

/// Enum dispatch for built-in nodes.
pub enum BuiltinNode {
    TestPattern(TestPatternNode),
    SequenceReader(SequenceReaderNode),
    ColorNegInvert(ColorNegInvertNode),
    SequenceWriter(SequenceWriterNode),
}

impl BuiltinNode {
    pub fn identifier(&self) -> &str {
        match self {
            BuiltinNode::TestPattern(n) => n.identifier(),
            BuiltinNode::SequenceReader(n) => n.identifier(),
            BuiltinNode::ColorNegInvert(n) => n.identifier(),
            BuiltinNode::SequenceWriter(n) => n.identifier(),
        }
    }

    pub fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        match self {
            BuiltinNode::TestPattern(n) => n.set_parameter(key, value),
            BuiltinNode::SequenceReader(n) => n.set_parameter(key, value),
            BuiltinNode::ColorNegInvert(n) => n.set_parameter(key, value),
            BuiltinNode::SequenceWriter(n) => n.set_parameter(key, value),
        }
    }

    pub fn open(&mut self) -> PipelineResult<Option<TimeDomain>> {
        match self {
            BuiltinNode::TestPattern(n) => n.open(),
            BuiltinNode::SequenceReader(n) => n.open(),
            BuiltinNode::ColorNegInvert(_) => Ok(None),
            BuiltinNode::SequenceWriter(n) => n.open(),
        }
    }

    pub fn process(&mut self, frame_index: u64, input: Option<&Frame>) -> PipelineResult<Frame> {
        match self {
            BuiltinNode::TestPattern(n) => n.process(frame_index),
            BuiltinNode::SequenceReader(n) => n.process(frame_index),
            BuiltinNode::ColorNegInvert(n) => n.process(frame_index, input),
            BuiltinNode::SequenceWriter(n) => n.process(frame_index, input),
        }
    }

    pub fn close(&mut self) {
        match self {
            BuiltinNode::TestPattern(_) | BuiltinNode::ColorNegInvert(_) => {}
            BuiltinNode::SequenceReader(n) => n.close(),
            BuiltinNode::SequenceWriter(n) => n.close(),
        }
    }
}

/// Wrapper that holds either a built-in node (enum dispatch) or a plugin (trait object).
pub enum AnyNode {
    Builtin(BuiltinNode),
    Plugin(Box<dyn EffectNode>),
}

impl AnyNode {
    pub fn identifier(&self) -> &str {
        match self {
            AnyNode::Builtin(n) => n.identifier(),
            AnyNode::Plugin(n) => n.identifier(),
        }
    }

    pub fn set_parameter(&mut self, key: &str, value: &ConfigValue) -> PipelineResult<bool> {
        match self {
            AnyNode::Builtin(n) => n.set_parameter(key, value),
            AnyNode::Plugin(n) => n.set_parameter(key, value),
        }
    }

    pub fn open(&mut self) -> PipelineResult<Option<TimeDomain>> {
        match self {
            AnyNode::Builtin(n) => n.open(),
            AnyNode::Plugin(n) => n.open(),
        }
    }

    pub fn process(&mut self, frame_index: u64, input: Option<&Frame>) -> PipelineResult<Frame> {
        match self {
            AnyNode::Builtin(n) => n.process(frame_index, input),
            AnyNode::Plugin(n) => n.process(frame_index, input),
        }
    }

    pub fn close(&mut self) {
        match self {
            AnyNode::Builtin(n) => n.close(),
            AnyNode::Plugin(n) => n.close(),
        }
    }
}

impl std::fmt::Debug for AnyNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnyNode::Builtin(n) => write!(f, "Builtin({})", n.identifier()),
            AnyNode::Plugin(n) => write!(f, "Plugin({})", n.identifier()),
        }
    }
}

impl From<BuiltinNode> for AnyNode {
    fn from(node: BuiltinNode) -> Self {
        AnyNode::Builtin(node)
    }
}

impl From<TestPatternNode> for AnyNode {
    fn from(node: TestPatternNode) -> Self {
        AnyNode::Builtin(BuiltinNode::TestPattern(node))
    }
}

impl From<SequenceReaderNode> for AnyNode {
    fn from(node: SequenceReaderNode) -> Self {
        AnyNode::Builtin(BuiltinNode::SequenceReader(node))
    }
}

impl From<ColorNegInvertNode> for AnyNode {
    fn from(node: ColorNegInvertNode) -> Self {
        AnyNode::Builtin(BuiltinNode::ColorNegInvert(node))
    }
}

impl From<SequenceWriterNode> for AnyNode {
    fn from(node: SequenceWriterNode) -> Self {
        AnyNode::Builtin(BuiltinNode::SequenceWriter(node))
    }
}

impl From<Box<dyn EffectNode>> for AnyNode {
    fn from(node: Box<dyn EffectNode>) -> Self {
        AnyNode::Plugin(node)
    }
}
