//! Plugin host boundary.
//!
//! The pipeline never talks to plugin binaries directly. It resolves
//! identifiers to [`PluginDescriptor`]s and asks for node instances through the
//! [`PluginHost`] trait. [`PluginRegistry`] is the in-process implementation
//! holding one factory per identifier.

use crate::config::{ConfigValue, SettingsTree};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::node::AnyNode;
use crate::pipeline::nodes;
use indexmap::IndexMap;
use std::fmt;

/// Role a plugin plays in a linear graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    /// Produces frames from nothing (files, generators, capture devices).
    Reader,
    /// Transforms the upstream frame.
    Effect,
    /// Consumes frames, typically writing them to disk.
    Writer,
}

impl PluginKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            PluginKind::Reader => "Reader",
            PluginKind::Effect => "Effect",
            PluginKind::Writer => "Writer",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A parameter a plugin accepts, with its default.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub name: String,
    pub default: ConfigValue,
}

/// Static description of a plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    pub identifier: String,
    pub label: String,
    pub version_major: u32,
    pub version_minor: u32,
    pub kind: PluginKind,
    pub parameters: Vec<ParamDescriptor>,
}

impl PluginDescriptor {
    pub fn new(identifier: impl Into<String>, label: impl Into<String>, kind: PluginKind) -> Self {
        Self {
            identifier: identifier.into(),
            label: label.into(),
            version_major: 1,
            version_minor: 0,
            kind,
            parameters: Vec::new(),
        }
    }

    pub fn with_version(mut self, major: u32, minor: u32) -> Self {
        self.version_major = major;
        self.version_minor = minor;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, default: impl Into<ConfigValue>) -> Self {
        self.parameters.push(ParamDescriptor {
            name: name.into(),
            default: default.into(),
        });
        self
    }

    /// Look up a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&ParamDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Parameters with their defaults, as stored in a pipeline settings tree.
    pub fn default_parameters(&self) -> SettingsTree {
        let mut tree = SettingsTree::new();
        for param in &self.parameters {
            tree.insert(param.name.clone(), param.default.clone());
        }
        tree
    }

    /// `identifier - vMAJOR.MINOR`, as listed to users.
    pub fn display_name(&self) -> String {
        format!(
            "{} - v{}.{}",
            self.identifier, self.version_major, self.version_minor
        )
    }
}

/// Resolves plugin identifiers and instantiates nodes.
#[cfg_attr(test, mockall::automock)]
pub trait PluginHost: Send + Sync {
    /// Descriptor for `identifier`, or `PluginNotFound`.
    fn resolve_plugin(&self, identifier: &str) -> PipelineResult<PluginDescriptor>;

    /// A fresh node for `identifier` with default parameters.
    fn instantiate_node(&self, identifier: &str) -> PipelineResult<AnyNode>;

    /// Every plugin this host can instantiate.
    fn plugins(&self) -> Vec<PluginDescriptor>;
}

type NodeFactory = Box<dyn Fn() -> PipelineResult<AnyNode> + Send + Sync>;

struct RegistryEntry {
    descriptor: PluginDescriptor,
    factory: NodeFactory,
}

/// In-process plugin host backed by factories.
#[derive(Default)]
pub struct PluginRegistry {
    entries: IndexMap<String, RegistryEntry>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every node shipped with the crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(nodes::TestPatternNode::descriptor(), || {
            Ok(nodes::TestPatternNode::new().into())
        });
        registry.register(nodes::SequenceReaderNode::descriptor(), || {
            Ok(nodes::SequenceReaderNode::new().into())
        });
        registry.register(nodes::ColorNegInvertNode::descriptor(), || {
            Ok(nodes::ColorNegInvertNode::new().into())
        });
        registry.register(nodes::ColorNegInvertNode::mask_remover_descriptor(), || {
            Ok(nodes::ColorNegInvertNode::mask_remover().into())
        });
        registry.register(nodes::SequenceWriterNode::descriptor(), || {
            Ok(nodes::SequenceWriterNode::new().into())
        });
        registry
    }

    /// Register (or replace) a plugin.
    pub fn register<F>(&mut self, descriptor: PluginDescriptor, factory: F)
    where
        F: Fn() -> PipelineResult<AnyNode> + Send + Sync + 'static,
    {
        tracing::debug!("Registering plugin {}", descriptor.display_name());
        self.entries.insert(
            descriptor.identifier.clone(),
            RegistryEntry {
                descriptor,
                factory: Box::new(factory),
            },
        );
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PluginHost for PluginRegistry {
    fn resolve_plugin(&self, identifier: &str) -> PipelineResult<PluginDescriptor> {
        self.entries
            .get(identifier)
            .map(|e| e.descriptor.clone())
            .ok_or_else(|| PipelineError::PluginNotFound(identifier.to_string()))
    }

    fn instantiate_node(&self, identifier: &str) -> PipelineResult<AnyNode> {
        let entry = self
            .entries
            .get(identifier)
            .ok_or_else(|| PipelineError::PluginNotFound(identifier.to_string()))?;
        (entry.factory)()
    }

    fn plugins(&self) -> Vec<PluginDescriptor> {
        self.entries.values().map(|e| e.descriptor.clone()).collect()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
