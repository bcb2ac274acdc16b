//! Session-level owner of an editable pipeline.
//!
//! A [`PipelineDocument`] keeps a [`PipelineModel`] and the [`SettingsTree`]
//! it is persisted as. Every mutation rebuilds the tree from the model (full
//! overwrite, never a merge). A tree that was just loaded is kept verbatim
//! until the first edit, so saving an untouched pipeline writes back what was
//! read.

use crate::config::{self, SettingsTree};
use crate::error::{KaliscopeError, Result};
use crate::pipeline::host::PluginHost;
use crate::pipeline::model::{PipelineModel, PluginSlot, KEY_PRESET_NAME};
use crate::pipeline::presets::{tag_preset_name, Preset};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct PipelineDocument {
    host: Arc<dyn PluginHost>,
    model: PipelineModel,
    settings: SettingsTree,
    preset_name: Option<String>,
    path: Option<PathBuf>,
}

impl PipelineDocument {
    /// An empty document resolving plugins through `host`.
    pub fn new(host: Arc<dyn PluginHost>) -> Self {
        Self {
            host,
            model: PipelineModel::new(),
            settings: SettingsTree::new(),
            preset_name: None,
            path: None,
        }
    }

    pub fn model(&self) -> &PipelineModel {
        &self.model
    }

    pub fn settings(&self) -> &SettingsTree {
        &self.settings
    }

    pub fn preset_name(&self) -> Option<&str> {
        self.preset_name.as_deref()
    }

    /// File the document was last loaded from or saved to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn host(&self) -> &Arc<dyn PluginHost> {
        &self.host
    }

    pub fn set_preset_name(&mut self, name: impl Into<String>) {
        self.preset_name = Some(name.into());
        self.resync();
    }

    /// Rebuild the settings tree from the model, preset name first.
    fn resync(&mut self) {
        let mut tree = SettingsTree::new();
        if let Some(name) = &self.preset_name {
            tree.insert(KEY_PRESET_NAME, name.as_str());
        }
        for (key, node) in self.model.serialize().iter() {
            tree.insert(key, node.clone());
        }
        self.settings = tree;
    }

    /// Replace the whole document with `tree`.
    fn replace_with(&mut self, tree: SettingsTree) {
        self.preset_name = tree.get_str(KEY_PRESET_NAME).map(str::to_string);
        self.model = PipelineModel::deserialize(&tree, self.host.as_ref());
        self.settings = tree;
        tracing::debug!(
            "Pipeline replaced: {} instances ({:?})",
            self.model.len(),
            self.preset_name
        );
    }

    /// Load `~/.kaliscope_pipeline.json`; a missing file gives an empty document.
    pub fn load_default(&mut self) -> Result<()> {
        let path = config::default_pipeline_path().ok_or_else(|| {
            KaliscopeError::Config("Could not determine home directory".to_string())
        })?;
        self.load_or_empty(&path)
    }

    /// Load `path` if it exists, otherwise reset to an empty document.
    pub fn load_or_empty(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No pipeline at {}, starting empty", path.display());
            self.replace_with(SettingsTree::new());
            self.path = None;
            return Ok(());
        }
        self.load_file(path)
    }

    /// Load a pipeline file. On failure the document is left unchanged.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut tree = SettingsTree::read(path)?;
        tag_preset_name(&mut tree, path);
        self.replace_with(tree);
        self.path = Some(path.to_path_buf());
        tracing::info!(
            "Loaded pipeline {} with {} instances",
            path.display(),
            self.model.len()
        );
        Ok(())
    }

    /// Write the settings tree (with its preset name) to `path`.
    pub fn save_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(name) = &self.preset_name {
            self.settings.set(KEY_PRESET_NAME, name.as_str());
        }
        self.settings.write(path)?;
        self.path = Some(path.to_path_buf());
        tracing::info!("Saved pipeline to {}", path.display());
        Ok(())
    }

    /// Replace the pipeline with a preset.
    pub fn apply_preset(&mut self, preset: &Preset) {
        self.replace_with(preset.tree.clone());
        self.preset_name = Some(preset.name.clone());
        self.resync();
        tracing::info!("Applied preset {}", preset.name);
    }

    /// Append a plugin. Without explicit parameters the plugin defaults are
    /// stored.
    pub fn add_plugin(
        &mut self,
        identifier: &str,
        parameters: Option<SettingsTree>,
    ) -> Result<PluginSlot> {
        let descriptor = self.host.resolve_plugin(identifier)?;
        let parameters = parameters.unwrap_or_else(|| descriptor.default_parameters());
        let slot = self.model.push(identifier, parameters);
        self.resync();
        tracing::debug!("Added {}", slot);
        Ok(slot)
    }

    /// Remove the selected positions. Returns the number removed.
    pub fn remove_selection(&mut self, selection: &[usize]) -> usize {
        let removed = self.model.remove_selection(selection);
        if removed > 0 {
            self.resync();
        }
        removed
    }

    /// Apply a completed reorder (see [`PipelineModel::reorder`]).
    pub fn reorder(&mut self, new_order: &[usize]) -> Result<()> {
        self.model.reorder(new_order)?;
        self.resync();
        Ok(())
    }

    /// Replace the parameters of one instance.
    pub fn edit_parameters(&mut self, slot: &PluginSlot, parameters: SettingsTree) -> Result<()> {
        self.model.set_parameters(slot, parameters)?;
        self.resync();
        Ok(())
    }
}

impl std::fmt::Debug for PipelineDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDocument")
            .field("preset_name", &self.preset_name)
            .field("instances", &self.model.identifiers())
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigValue;
    use crate::pipeline::host::PluginRegistry;
    use crate::pipeline::nodes::{COLOR_NEG_INVERT_ID, SEQUENCE_WRITER_ID, TEST_PATTERN_ID};

    fn document() -> PipelineDocument {
        PipelineDocument::new(Arc::new(PluginRegistry::with_builtins()))
    }

    #[test]
    fn test_add_plugin_stores_defaults_and_resyncs() {
        let mut doc = document();
        let slot = doc.add_plugin(COLOR_NEG_INVERT_ID, None).unwrap();
        assert_eq!(slot.position, 0);
        assert_eq!(
            doc.settings().get_value("0.parameters.Red filter color"),
            Some(&ConfigValue::Int(247))
        );
    }

    #[test]
    fn test_add_unknown_plugin_fails() {
        let mut doc = document();
        assert!(matches!(
            doc.add_plugin("acme.blur", None),
            Err(KaliscopeError::Pipeline(_))
        ));
        assert!(doc.model().is_empty());
    }

    #[test]
    fn test_mutations_resync_tree() {
        let mut doc = document();
        doc.add_plugin(TEST_PATTERN_ID, None).unwrap();
        doc.add_plugin(COLOR_NEG_INVERT_ID, None).unwrap();
        doc.add_plugin(SEQUENCE_WRITER_ID, None).unwrap();

        doc.reorder(&[0, 2, 1]).unwrap();
        assert_eq!(doc.settings().get_str("1.pluginIdentifier"), Some(SEQUENCE_WRITER_ID));

        doc.remove_selection(&[1]);
        assert_eq!(doc.settings().get_str("1.pluginIdentifier"), Some(COLOR_NEG_INVERT_ID));
        assert!(doc.settings().get("2").is_none());
    }

    #[test]
    fn test_edit_parameters_rejects_stale_slot() {
        let mut doc = document();
        doc.add_plugin(TEST_PATTERN_ID, None).unwrap();
        let stale = PluginSlot::new(0, COLOR_NEG_INVERT_ID);
        assert!(doc.edit_parameters(&stale, SettingsTree::new()).is_err());

        let mut params = SettingsTree::new();
        params.insert("Frame count", 5i64);
        doc.edit_parameters(&PluginSlot::new(0, TEST_PATTERN_ID), params)
            .unwrap();
        assert_eq!(
            doc.settings().get_value("0.parameters.Frame count"),
            Some(&ConfigValue::Int(5))
        );
    }

    #[test]
    fn test_save_and_load_round_trip_with_tagging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("film.json");

        let mut doc = document();
        doc.add_plugin(TEST_PATTERN_ID, None).unwrap();
        doc.save_file(&path).unwrap();

        let mut loaded = document();
        loaded.load_file(&path).unwrap();
        assert_eq!(loaded.preset_name(), Some("film.json"));
        assert_eq!(loaded.model(), doc.model());
        assert_eq!(loaded.path(), Some(path.as_path()));
    }

    #[test]
    fn test_failed_load_leaves_document_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ broken").unwrap();

        let mut doc = document();
        doc.add_plugin(TEST_PATTERN_ID, None).unwrap();
        doc.set_preset_name("mine");
        let before = doc.settings().clone();

        let err = doc.load_file(&path).unwrap_err();
        assert!(matches!(err, KaliscopeError::Persistence { .. }));
        assert_eq!(doc.settings(), &before);
        assert_eq!(doc.preset_name(), Some("mine"));
    }

    #[test]
    fn test_load_or_empty_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = document();
        doc.add_plugin(TEST_PATTERN_ID, None).unwrap();
        doc.load_or_empty(dir.path().join("absent.json")).unwrap();
        assert!(doc.model().is_empty());
    }

    #[test]
    fn test_apply_preset_replaces_wholesale() {
        let mut doc = document();
        doc.add_plugin(SEQUENCE_WRITER_ID, None).unwrap();

        let mut tree = SettingsTree::new();
        tree.set("0.pluginIdentifier", TEST_PATTERN_ID);
        tree.set("1.pluginIdentifier", COLOR_NEG_INVERT_ID);
        let preset = Preset {
            name: "negative".to_string(),
            path: PathBuf::from("presets/negative.json"),
            tree,
        };

        doc.apply_preset(&preset);
        assert_eq!(doc.preset_name(), Some("negative"));
        assert_eq!(doc.model().identifiers(), vec![TEST_PATTERN_ID, COLOR_NEG_INVERT_ID]);
        assert_eq!(doc.settings().get_str(KEY_PRESET_NAME), Some("negative"));
    }
}
