//! Hierarchical, ordered key-value settings store.
//!
//! A [`SettingsTree`] maps string keys to either a scalar [`ConfigValue`] or a
//! nested subtree. Sibling insertion order is preserved, which matters when a
//! tree carries a pipeline (sibling keys are stringified slot positions).
//!
//! Trees are persisted as JSON or TOML; the format is picked from the file
//! extension.
//!
//! ```text
//! presetName = "Kodak 5207"
//! [0]
//! pluginIdentifier = "kaliscope.testpattern"
//! [0.parameters]
//! frames = 24
//! ```

use crate::error::{KaliscopeError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Path separator used by [`SettingsTree::get`] and [`SettingsTree::set`].
pub const PATH_SEPARATOR: char = '.';

/// Scalar value stored at a settings leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(v) => write!(f, "{}", v),
            ConfigValue::Int(v) => write!(f, "{}", v),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::String(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::String(v)
    }
}

/// A settings entry: either a scalar leaf or a nested subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingsNode {
    Value(ConfigValue),
    Tree(SettingsTree),
}

impl SettingsNode {
    pub fn as_value(&self) -> Option<&ConfigValue> {
        match self {
            SettingsNode::Value(v) => Some(v),
            SettingsNode::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&SettingsTree> {
        match self {
            SettingsNode::Tree(t) => Some(t),
            SettingsNode::Value(_) => None,
        }
    }
}

impl From<ConfigValue> for SettingsNode {
    fn from(v: ConfigValue) -> Self {
        SettingsNode::Value(v)
    }
}

impl From<SettingsTree> for SettingsNode {
    fn from(t: SettingsTree) -> Self {
        SettingsNode::Tree(t)
    }
}

impl From<&str> for SettingsNode {
    fn from(v: &str) -> Self {
        SettingsNode::Value(v.into())
    }
}

impl From<String> for SettingsNode {
    fn from(v: String) -> Self {
        SettingsNode::Value(v.into())
    }
}

impl From<bool> for SettingsNode {
    fn from(v: bool) -> Self {
        SettingsNode::Value(v.into())
    }
}

impl From<i64> for SettingsNode {
    fn from(v: i64) -> Self {
        SettingsNode::Value(v.into())
    }
}

impl From<f64> for SettingsNode {
    fn from(v: f64) -> Self {
        SettingsNode::Value(v.into())
    }
}

/// File formats a settings tree can be persisted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Json,
    Toml,
}

impl SettingsFormat {
    /// File extensions recognised when reading or writing settings.
    pub const EXTENSIONS: &'static [&'static str] = &["json", "toml"];

    /// Pick the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(SettingsFormat::Json),
            "toml" => Some(SettingsFormat::Toml),
            _ => None,
        }
    }
}

/// Ordered hierarchical key-value store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsTree {
    entries: IndexMap<String, SettingsNode>,
}

impl SettingsTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over direct children in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingsNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys of direct children in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Insert a direct child without interpreting `key` as a path.
    pub fn insert(&mut self, key: impl Into<String>, node: impl Into<SettingsNode>) {
        self.entries.insert(key.into(), node.into());
    }

    /// Look up a node by dotted path.
    pub fn get(&self, path: &str) -> Option<&SettingsNode> {
        let mut segments = path.split(PATH_SEPARATOR).filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut node = self.entries.get(first)?;
        for segment in segments {
            node = node.as_tree()?.entries.get(segment)?;
        }
        Some(node)
    }

    pub fn get_value(&self, path: &str) -> Option<&ConfigValue> {
        self.get(path).and_then(SettingsNode::as_value)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get_value(path).and_then(ConfigValue::as_str)
    }

    pub fn get_tree(&self, path: &str) -> Option<&SettingsTree> {
        self.get(path).and_then(SettingsNode::as_tree)
    }

    /// Set a node by dotted path, creating intermediate subtrees.
    ///
    /// A scalar found where a subtree is needed is replaced. An empty path is
    /// ignored.
    pub fn set(&mut self, path: &str, node: impl Into<SettingsNode>) {
        let segments: Vec<&str> = path
            .split(PATH_SEPARATOR)
            .filter(|s| !s.is_empty())
            .collect();
        let Some((last, parents)) = segments.split_last() else {
            tracing::debug!("Ignoring settings write with empty path");
            return;
        };

        let mut tree = self;
        for segment in parents {
            let entry = tree
                .entries
                .entry((*segment).to_string())
                .or_insert_with(|| SettingsNode::Tree(SettingsTree::new()));
            if !matches!(entry, SettingsNode::Tree(_)) {
                *entry = SettingsNode::Tree(SettingsTree::new());
            }
            tree = match entry {
                SettingsNode::Tree(t) => t,
                SettingsNode::Value(_) => unreachable!("entry was just replaced by a subtree"),
            };
        }
        tree.entries.insert((*last).to_string(), node.into());
    }

    /// Remove a node by dotted path, keeping sibling order intact.
    pub fn remove(&mut self, path: &str) -> Option<SettingsNode> {
        let segments: Vec<&str> = path
            .split(PATH_SEPARATOR)
            .filter(|s| !s.is_empty())
            .collect();
        let (last, parents) = segments.split_last()?;

        let mut tree = self;
        for segment in parents {
            tree = match tree.entries.get_mut(*segment)? {
                SettingsNode::Tree(t) => t,
                SettingsNode::Value(_) => return None,
            };
        }
        tree.entries.shift_remove(*last)
    }

    // ── Persistence ──

    /// Parse a tree from JSON text.
    pub fn from_json_str(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Render the tree as pretty-printed JSON.
    pub fn to_json_string(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Read a tree from `path`, choosing the format from its extension.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = SettingsFormat::from_path(path).ok_or_else(|| {
            KaliscopeError::persistence(path, "unsupported settings file extension")
        })?;

        let content = std::fs::read_to_string(path)
            .map_err(|e| KaliscopeError::persistence(path, format!("failed to read: {}", e)))?;

        match format {
            SettingsFormat::Json => Self::from_json_str(&content)
                .map_err(|e| KaliscopeError::persistence(path, format!("invalid JSON: {}", e))),
            SettingsFormat::Toml => toml::from_str(&content)
                .map_err(|e| KaliscopeError::persistence(path, format!("invalid TOML: {}", e))),
        }
    }

    /// Write the tree to `path`, choosing the format from its extension.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = SettingsFormat::from_path(path).ok_or_else(|| {
            KaliscopeError::persistence(path, "unsupported settings file extension")
        })?;

        let content = match format {
            SettingsFormat::Json => self
                .to_json_string()
                .map_err(|e| KaliscopeError::persistence(path, e.to_string()))?,
            SettingsFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| KaliscopeError::persistence(path, e.to_string()))?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                KaliscopeError::persistence(path, format!("failed to create directory: {}", e))
            })?;
        }

        std::fs::write(path, content)
            .map_err(|e| KaliscopeError::persistence(path, format!("failed to write: {}", e)))
    }
}
