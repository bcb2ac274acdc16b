//! Test data builders for pipelines and graphs

use kaliscope_rs::config::{ConfigValue, SettingsTree};
use kaliscope_rs::pipeline::nodes::{test_pattern, TEST_PATTERN_ID};
use kaliscope_rs::pipeline::{GraphBuilder, PipelineModel, PluginHost, ProcessingGraph};
use std::sync::Arc;

/// Builder for pipeline models
#[derive(Default)]
pub struct ModelBuilder {
    model: PipelineModel,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin with no explicit parameters
    pub fn plugin(self, identifier: &str) -> Self {
        self.plugin_with(identifier, &[])
    }

    /// Append a plugin with scalar parameters
    pub fn plugin_with(mut self, identifier: &str, params: &[(&str, ConfigValue)]) -> Self {
        let mut tree = SettingsTree::new();
        for (key, value) in params {
            tree.insert(*key, value.clone());
        }
        self.model.push(identifier, tree);
        self
    }

    /// Append a small test pattern reader producing `frames` frames
    pub fn test_pattern(self, frames: i64, width: i64) -> Self {
        self.plugin_with(
            TEST_PATTERN_ID,
            &[
                (test_pattern::PARAM_FRAME_COUNT, ConfigValue::Int(frames)),
                (test_pattern::PARAM_WIDTH, ConfigValue::Int(width)),
                (test_pattern::PARAM_HEIGHT, ConfigValue::Int(4)),
            ],
        )
    }

    pub fn build(self) -> PipelineModel {
        self.model
    }
}

/// Compile `model` with `host`, failing the test on error
pub fn build_graph(host: Arc<dyn PluginHost>, model: &PipelineModel) -> Arc<ProcessingGraph> {
    Arc::new(
        GraphBuilder::new(host)
            .build(model)
            .expect("graph should build"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_builder() {
        let model = ModelBuilder::new().test_pattern(3, 8).plugin("acme.blur").build();
        assert_eq!(model.identifiers(), vec![TEST_PATTERN_ID, "acme.blur"]);
        assert_eq!(
            model.get(0).unwrap().parameters.get_value("Frame count"),
            Some(&ConfigValue::Int(3))
        );
    }
}
