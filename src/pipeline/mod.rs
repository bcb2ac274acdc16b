//! Frame processing pipeline.
//!
//! An editable [`PipelineModel`] (ordered plugin instances with parameters)
//! is compiled by [`GraphBuilder`] into a linear [`ProcessingGraph`]:
//!
//! ```text
//! [reader] ──► [effect] ──► [effect] ──► [writer]
//!                                           │
//!                           FrameCache ◄────┘ (keyed by graph identity)
//! ```
//!
//! # Design
//!
//! - **Enum dispatch for built-ins**: `BuiltinNode` covers the shipped nodes,
//!   `EffectNode` trait objects cover everything a host adds.
//! - **Host boundary**: plugins are only reached through [`PluginHost`].
//! - **Settings tree persistence**: [`PipelineDocument`] resyncs the whole
//!   tree after every edit.
//! - **Shared pixels**: [`Frame`] clones share one `Arc<[u8]>`.

pub mod cache;
pub mod compiler;
pub mod document;
pub mod error;
pub mod frame;
pub mod graph;
pub mod host;
pub mod id;
pub mod model;
pub mod node;
pub mod nodes;
pub mod presets;

pub use cache::{CacheStats, FrameCache};
pub use compiler::GraphBuilder;
pub use document::PipelineDocument;
pub use error::{PipelineError, PipelineResult};
pub use frame::{Frame, PixelFormat, TimeDomain};
pub use graph::{GraphNode, ProcessingGraph, SkippedInstance};
pub use host::{ParamDescriptor, PluginDescriptor, PluginHost, PluginKind, PluginRegistry};
pub use id::{GraphId, NodeId};
pub use model::{PipelineModel, PluginInstance, PluginSlot, KEY_PRESET_NAME};
pub use node::{AnyNode, BuiltinNode, EffectNode};
pub use presets::{Preset, PresetLibrary};
