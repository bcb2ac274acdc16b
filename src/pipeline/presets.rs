//! Read-only pipeline presets loaded from a directory.

use crate::config::{SettingsFormat, SettingsTree, PRESETS_DIRECTORY};
use crate::pipeline::model::KEY_PRESET_NAME;
use std::path::{Path, PathBuf};

/// A named pipeline settings tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: String,
    pub path: PathBuf,
    pub tree: SettingsTree,
}

/// File name used to tag a settings tree that carries no preset name.
pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Ensure `tree` has a preset name, falling back to the file name of `path`.
pub(crate) fn tag_preset_name(tree: &mut SettingsTree, path: &Path) -> String {
    if let Some(name) = tree.get_str(KEY_PRESET_NAME) {
        return name.to_string();
    }
    let name = file_name_of(path);
    tree.set(KEY_PRESET_NAME, name.as_str());
    name
}

#[derive(Debug, Clone, Default)]
pub struct PresetLibrary {
    presets: Vec<Preset>,
}

impl PresetLibrary {
    /// Load every preset file in `dir`, sorted by file name.
    ///
    /// A missing directory gives an empty library. Files that fail to parse
    /// are skipped with a warning.
    pub fn load_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("No presets loaded from {}: {}", dir.display(), e);
                return Self::default();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && SettingsFormat::from_path(path).is_some())
            .collect();
        paths.sort();

        let mut presets = Vec::with_capacity(paths.len());
        for path in paths {
            match SettingsTree::read(&path) {
                Ok(mut tree) => {
                    let name = tag_preset_name(&mut tree, &path);
                    presets.push(Preset { name, path, tree });
                }
                Err(e) => tracing::warn!("Skipping preset: {}", e),
            }
        }

        tracing::info!("Loaded {} presets from {}", presets.len(), dir.display());
        Self { presets }
    }

    /// Load presets from `./presets`.
    pub fn load_default() -> Self {
        Self::load_dir(PRESETS_DIRECTORY)
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn names(&self) -> Vec<&str> {
        self.presets.iter().map(|p| p.name.as_str()).collect()
    }

    /// First preset called `name`.
    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}
