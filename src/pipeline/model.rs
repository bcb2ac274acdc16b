//! Ordered, user-editable pipeline of plugin instances.
//!
//! The model is the editable form of a pipeline. It is persisted through a
//! [`SettingsTree`] in which every instance lives under its decimal position:
//!
//! ```text
//! presetName = "Kodak 5207 scan"
//! [0]
//! pluginIdentifier = "kaliscope.testpattern"
//! [1]
//! pluginIdentifier = "kaliscope.colorneginvert"
//! [1.parameters]
//! "Invert colors" = true
//! ```
//!
//! Positions are always dense from zero; every mutation renumbers.

use crate::config::{SettingsNode, SettingsTree};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::host::PluginHost;
use std::fmt;

/// Key holding an instance's plugin identifier.
pub const KEY_PLUGIN_IDENTIFIER: &str = "pluginIdentifier";

/// Key holding an instance's parameter subtree.
pub const KEY_PARAMETERS: &str = "parameters";

/// Reserved top-level key naming the pipeline.
pub const KEY_PRESET_NAME: &str = "presetName";

/// One plugin in the pipeline with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginInstance {
    pub position: usize,
    pub plugin_identifier: String,
    pub parameters: SettingsTree,
}

impl PluginInstance {
    pub fn slot(&self) -> PluginSlot {
        PluginSlot::new(self.position, self.plugin_identifier.clone())
    }
}

/// Identity of an instance for editing: its position and plugin identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginSlot {
    pub position: usize,
    pub plugin_identifier: String,
}

impl PluginSlot {
    pub fn new(position: usize, plugin_identifier: impl Into<String>) -> Self {
        Self {
            position,
            plugin_identifier: plugin_identifier.into(),
        }
    }
}

impl fmt::Display for PluginSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.plugin_identifier, self.position)
    }
}

/// Ordered sequence of plugin instances.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineModel {
    instances: Vec<PluginInstance>,
}

impl PipelineModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> &[PluginInstance] {
        &self.instances
    }

    pub fn get(&self, position: usize) -> Option<&PluginInstance> {
        self.instances.get(position)
    }

    /// Plugin identifiers in pipeline order.
    pub fn identifiers(&self) -> Vec<&str> {
        self.instances
            .iter()
            .map(|i| i.plugin_identifier.as_str())
            .collect()
    }

    fn renumber(&mut self) {
        for (position, instance) in self.instances.iter_mut().enumerate() {
            instance.position = position;
        }
    }

    /// Append an instance at the end.
    pub fn push(
        &mut self,
        plugin_identifier: impl Into<String>,
        parameters: SettingsTree,
    ) -> PluginSlot {
        let instance = PluginInstance {
            position: self.instances.len(),
            plugin_identifier: plugin_identifier.into(),
            parameters,
        };
        let slot = instance.slot();
        self.instances.push(instance);
        slot
    }

    /// Remove every instance whose position is in `selection`.
    ///
    /// Out-of-range and duplicate positions are ignored. Returns the number
    /// of instances removed.
    pub fn remove_selection(&mut self, selection: &[usize]) -> usize {
        let before = self.instances.len();
        let mut position = 0;
        self.instances.retain(|_| {
            let keep = !selection.contains(&position);
            position += 1;
            keep
        });
        self.renumber();
        before - self.instances.len()
    }

    /// Rearrange the whole sequence.
    ///
    /// `new_order[i]` is the current position of the instance that moves to
    /// position `i`; it must be a permutation of `0..len`.
    pub fn reorder(&mut self, new_order: &[usize]) -> PipelineResult<()> {
        let len = self.instances.len();
        let mut seen = vec![false; len];
        if new_order.len() != len {
            return Err(PipelineError::InvalidEdit(format!(
                "reorder lists {} positions for {} instances",
                new_order.len(),
                len
            )));
        }
        for &old in new_order {
            match seen.get_mut(old) {
                Some(flag) if !*flag => *flag = true,
                _ => {
                    return Err(PipelineError::InvalidEdit(format!(
                        "reorder is not a permutation of 0..{}",
                        len
                    )))
                }
            }
        }

        let mut old: Vec<Option<PluginInstance>> = self.instances.drain(..).map(Some).collect();
        self.instances = new_order
            .iter()
            .filter_map(|&i| old.get_mut(i).and_then(Option::take))
            .collect();
        self.renumber();
        Ok(())
    }

    /// Replace the parameters of the instance identified by `slot`.
    pub fn set_parameters(&mut self, slot: &PluginSlot, parameters: SettingsTree) -> PipelineResult<()> {
        let instance = self
            .instances
            .get_mut(slot.position)
            .filter(|i| i.plugin_identifier == slot.plugin_identifier)
            .ok_or_else(|| {
                PipelineError::InvalidEdit(format!("no instance matches slot {}", slot))
            })?;
        instance.parameters = parameters;
        Ok(())
    }

    /// Write the model into a fresh settings tree.
    pub fn serialize(&self) -> SettingsTree {
        let mut tree = SettingsTree::new();
        for instance in &self.instances {
            let mut entry = SettingsTree::new();
            entry.insert(KEY_PLUGIN_IDENTIFIER, instance.plugin_identifier.as_str());
            entry.insert(KEY_PARAMETERS, instance.parameters.clone());
            tree.insert(instance.position.to_string(), entry);
        }
        tree
    }

    /// Rebuild a model from a settings tree.
    ///
    /// Only top-level keys that parse as unsigned integers are considered,
    /// in numeric order. Entries that are malformed or name a plugin the host
    /// cannot resolve are skipped with a warning.
    pub fn deserialize(tree: &SettingsTree, host: &dyn PluginHost) -> Self {
        let mut numbered: Vec<(u64, &str, &SettingsNode)> = tree
            .iter()
            .filter_map(|(key, node)| key.parse::<u64>().ok().map(|n| (n, key, node)))
            .collect();
        numbered.sort_by_key(|(n, _, _)| *n);

        let mut model = Self::new();
        for (_, key, node) in numbered {
            let Some(entry) = node.as_tree() else {
                tracing::warn!("Skipping pipeline entry {}: not a subtree", key);
                continue;
            };
            let Some(identifier) = entry.get_str(KEY_PLUGIN_IDENTIFIER) else {
                tracing::warn!("Skipping pipeline entry {}: no {}", key, KEY_PLUGIN_IDENTIFIER);
                continue;
            };
            if let Err(e) = host.resolve_plugin(identifier) {
                tracing::warn!("Skipping pipeline entry {}: {}", key, e);
                continue;
            }
            let parameters = entry.get_tree(KEY_PARAMETERS).cloned().unwrap_or_default();
            model.push(identifier, parameters);
        }
        model
    }
}
