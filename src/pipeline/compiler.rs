use super::cache::FrameCache;
use super::error::{PipelineError, PipelineResult};
use super::graph::{GraphNode, ProcessingGraph, SkippedInstance};
use super::host::{PluginDescriptor, PluginHost, PluginKind};
use super::id::NodeId;
use super::model::{PipelineModel, PluginInstance};
use super::node::AnyNode;
use super::nodes::PARAM_FRAME_RATE;
use crate::config::{ConfigValue, EngineConfig, SettingsNode};
use std::sync::Arc;

/// Compiles a pipeline model into a runnable processing graph
pub struct GraphBuilder {
    host: Arc<dyn PluginHost>,
    cache: Option<Arc<FrameCache>>,
    cache_capacity: usize,
    default_frame_rate: f64,
}

impl GraphBuilder {
    pub fn new(host: Arc<dyn PluginHost>) -> Self {
        Self {
            host,
            cache: None,
            cache_capacity: crate::config::DEFAULT_CACHE_CAPACITY,
            default_frame_rate: crate::config::DEFAULT_FRAME_RATE,
        }
    }

    /// Take the cache capacity and reader frame rate from an engine
    /// configuration.
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.cache_capacity = config.cache_capacity;
        self.default_frame_rate = config.default_frame_rate;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Share an existing cache instead of creating one per graph.
    pub fn with_cache(mut self, cache: Arc<FrameCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build a graph from a snapshot of `model`.
    ///
    /// Instances that cannot be resolved or instantiated are left out and
    /// reported through [`ProcessingGraph::skipped`]; the chain closes over
    /// the gap.
    ///
    /// # Errors
    /// `GraphBuild` when no instance resolves, or when the first resolved
    /// node is not a reader.
    pub fn build(&self, model: &PipelineModel) -> PipelineResult<ProcessingGraph> {
        let mut nodes: Vec<GraphNode> = Vec::with_capacity(model.len());
        let mut skipped = Vec::new();

        for instance in model.instances() {
            match self.resolve(instance) {
                Ok((descriptor, node)) => nodes.push(GraphNode {
                    id: NodeId(nodes.len() as u32),
                    identifier: descriptor.identifier,
                    kind: descriptor.kind,
                    node,
                }),
                Err(e) => {
                    tracing::warn!(
                        "Skipping {} at position {}: {}",
                        instance.plugin_identifier,
                        instance.position,
                        e
                    );
                    skipped.push(SkippedInstance {
                        position: instance.position,
                        plugin_identifier: instance.plugin_identifier.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let first = nodes.first().ok_or_else(|| {
            PipelineError::GraphBuild("pipeline has no usable plugins".to_string())
        })?;
        if first.kind != PluginKind::Reader {
            return Err(PipelineError::GraphBuild(format!(
                "first plugin {} is a {}, not a reader",
                first.identifier, first.kind
            )));
        }

        let writer = nodes
            .iter()
            .skip(1)
            .rev()
            .find(|n| n.kind == PluginKind::Writer)
            .map(|n| n.id);
        if writer.is_none() {
            tracing::debug!("No writer in pipeline, graph is preview-only");
        }

        let cache = self
            .cache
            .clone()
            .unwrap_or_else(|| Arc::new(FrameCache::new(self.cache_capacity)));

        let graph = ProcessingGraph::new(nodes, writer, cache, skipped);
        tracing::info!(
            "Built graph {} with {} nodes ({} skipped)",
            graph.id(),
            graph.len(),
            graph.skipped().len()
        );
        Ok(graph)
    }

    /// Resolve, instantiate and configure one instance.
    ///
    /// Readers start from the configured frame rate; a rate stored on the
    /// instance overrides it.
    fn resolve(&self, instance: &PluginInstance) -> PipelineResult<(PluginDescriptor, AnyNode)> {
        let descriptor = self.host.resolve_plugin(&instance.plugin_identifier)?;
        let mut node = self.host.instantiate_node(&instance.plugin_identifier)?;

        if descriptor.kind == PluginKind::Reader && descriptor.parameter(PARAM_FRAME_RATE).is_some() {
            let rate = ConfigValue::Float(self.default_frame_rate);
            if let Err(e) = node.set_parameter(PARAM_FRAME_RATE, &rate) {
                tracing::warn!("{}: default frame rate rejected, {}", descriptor.identifier, e);
            }
        }

        for (key, value) in instance.parameters.iter() {
            let SettingsNode::Value(value) = value else {
                tracing::debug!("{}: ignoring parameter group {:?}", descriptor.identifier, key);
                continue;
            };
            if descriptor.parameter(key).is_none() {
                tracing::debug!("{}: ignoring unknown parameter {:?}", descriptor.identifier, key);
                continue;
            }
            match node.set_parameter(key, value) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("{}: parameter {:?} not applied", descriptor.identifier, key)
                }
                Err(e) => tracing::warn!("{}: keeping default, {}", descriptor.identifier, e),
            }
        }

        Ok((descriptor, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettingsTree;
    use crate::pipeline::host::{MockPluginHost, PluginRegistry};
    use crate::pipeline::nodes::{
        COLOR_NEG_INVERT_ID, SEQUENCE_WRITER_ID, TEST_PATTERN_ID,
    };

    fn builder() -> GraphBuilder {
        GraphBuilder::new(Arc::new(PluginRegistry::with_builtins()))
    }

    fn model_of(ids: &[&str]) -> PipelineModel {
        let mut model = PipelineModel::new();
        for id in ids {
            model.push(*id, SettingsTree::new());
        }
        model
    }

    #[test]
    fn test_build_linear_chain_with_writer() {
        let graph = builder()
            .build(&model_of(&[TEST_PATTERN_ID, COLOR_NEG_INVERT_ID, SEQUENCE_WRITER_ID]))
            .unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.writer(), Some(NodeId(2)));
        assert!(graph.skipped().is_empty());
    }

    #[test]
    fn test_empty_model_is_build_error() {
        let err = builder().build(&PipelineModel::new()).unwrap_err();
        assert!(matches!(err, PipelineError::GraphBuild(_)));
    }

    #[test]
    fn test_first_node_must_be_reader() {
        let err = builder()
            .build(&model_of(&[COLOR_NEG_INVERT_ID, TEST_PATTERN_ID]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::GraphBuild(_)));
    }

    #[test]
    fn test_unresolvable_instance_is_skipped() {
        let graph = builder()
            .build(&model_of(&[TEST_PATTERN_ID, "acme.blur", COLOR_NEG_INVERT_ID]))
            .unwrap();
        assert_eq!(
            graph.node_identifiers(),
            &[TEST_PATTERN_ID.to_string(), COLOR_NEG_INVERT_ID.to_string()]
        );
        assert_eq!(graph.skipped().len(), 1);
        assert_eq!(graph.skipped()[0].position, 1);
        assert_eq!(graph.writer(), None);
    }

    #[test]
    fn test_parameters_applied_and_unknown_ignored() {
        let mut params = SettingsTree::new();
        params.insert("Frame count", 3i64);
        params.insert("Sharpness", 9i64);
        let mut model = PipelineModel::new();
        model.push(TEST_PATTERN_ID, params);

        let graph = builder().build(&model).unwrap();
        assert_eq!(graph.open().unwrap().last, 2);
    }

    #[test]
    fn test_bad_parameter_keeps_default() {
        let mut params = SettingsTree::new();
        params.insert("Frame count", "many");
        let mut model = PipelineModel::new();
        model.push(TEST_PATTERN_ID, params);

        let graph = builder().build(&model).unwrap();
        assert_eq!(graph.open().unwrap().last, 23);
    }

    #[test]
    fn test_instantiation_failure_is_skipped() {
        let mut host = MockPluginHost::new();
        host.expect_resolve_plugin().returning(|id| {
            let kind = if id == TEST_PATTERN_ID {
                PluginKind::Reader
            } else {
                PluginKind::Effect
            };
            Ok(PluginDescriptor::new(id, id, kind))
        });
        host.expect_instantiate_node().returning(|id| {
            if id == TEST_PATTERN_ID {
                Ok(crate::pipeline::nodes::TestPatternNode::new().into())
            } else {
                Err(PipelineError::GraphBuild(format!("{} failed to load", id)))
            }
        });

        let graph = GraphBuilder::new(Arc::new(host))
            .build(&model_of(&[TEST_PATTERN_ID, "acme.broken"]))
            .unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.skipped()[0].plugin_identifier, "acme.broken");
    }

    #[test]
    fn test_config_frame_rate_reaches_reader_frames() {
        let config = EngineConfig::default().with_default_frame_rate(30.0);
        let graph = builder()
            .with_config(&config)
            .build(&model_of(&[TEST_PATTERN_ID, COLOR_NEG_INVERT_ID]))
            .unwrap();
        graph.open().unwrap();
        assert_eq!(graph.compute_frame(0).unwrap().frame_rate(), 30.0);
    }

    #[test]
    fn test_stored_frame_rate_overrides_config() {
        let mut params = SettingsTree::new();
        params.insert(PARAM_FRAME_RATE, 18.0);
        let mut model = PipelineModel::new();
        model.push(TEST_PATTERN_ID, params);

        let config = EngineConfig::default().with_default_frame_rate(30.0);
        let graph = builder().with_config(&config).build(&model).unwrap();
        graph.open().unwrap();
        assert_eq!(graph.compute_frame(0).unwrap().frame_rate(), 18.0);
    }

    #[test]
    fn test_shared_cache() {
        let cache = Arc::new(FrameCache::new(3));
        let graph = builder()
            .with_cache(cache.clone())
            .build(&model_of(&[TEST_PATTERN_ID]))
            .unwrap();
        assert!(Arc::ptr_eq(graph.cache(), &cache));
    }
}
