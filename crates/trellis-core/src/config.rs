//! Settings shared by the index and the graph builder

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::RelationshipKind;

/// Settings file looked up in the vault root.
pub const CONFIG_FILE: &str = "trellis.toml";

/// Allow-list entry that puts every document in scope.
pub const SCAN_ALL: &str = "*";

/// Frontmatter property names backing each relationship kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyBindings {
    pub parent: String,
    pub children: String,
    pub related: String,
}

impl PropertyBindings {
    pub fn property(&self, kind: RelationshipKind) -> &str {
        match kind {
            RelationshipKind::Parent => &self.parent,
            RelationshipKind::Children => &self.children,
            RelationshipKind::Related => &self.related,
        }
    }
}

impl Default for PropertyBindings {
    fn default() -> Self {
        PropertyBindings {
            parent: "parent".to_string(),
            children: "children".to_string(),
            related: "related".to_string(),
        }
    }
}

/// Where the parent/child hierarchy is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HierarchySource {
    /// The `parent`/`children` frontmatter properties.
    #[default]
    Frontmatter,
    /// A nested bullet list of links in the body of the given document.
    List(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub properties: PropertyBindings,
    /// Folders whose documents are indexed; `*` indexes everything.
    pub scan_directories: Vec<String>,
    pub hierarchy_max_depth: usize,
    pub constellation_max_depth: usize,
    /// Property naming which of several parents the upward walk follows.
    pub prioritize_parent_property: Option<String>,
    pub maintain_indirect_connections: bool,
    pub modify_debounce_ms: u64,
    pub rename_debounce_ms: u64,
    pub scan_concurrency: usize,
    pub hierarchy_source: HierarchySource,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            properties: PropertyBindings::default(),
            scan_directories: vec![SCAN_ALL.to_string()],
            hierarchy_max_depth: 5,
            constellation_max_depth: 2,
            prioritize_parent_property: None,
            maintain_indirect_connections: false,
            modify_debounce_ms: 300,
            rename_debounce_ms: 1500,
            scan_concurrency: 10,
            hierarchy_source: HierarchySource::Frontmatter,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `trellis.toml` from the vault root, falling back to defaults when absent.
    pub fn load_from_vault(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILE, root.display());
            return Ok(Settings::default());
        }
        Self::load(&path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hierarchy_max_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "hierarchy_max_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.constellation_max_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "constellation_max_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.scan_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "scan_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        for kind in RelationshipKind::ALL {
            if self.properties.property(kind).trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "properties",
                    reason: format!("{:?} property name is empty", kind),
                });
            }
        }
        Ok(())
    }

    pub fn modify_debounce(&self) -> Duration {
        Duration::from_millis(self.modify_debounce_ms)
    }

    pub fn rename_debounce(&self) -> Duration {
        Duration::from_millis(self.rename_debounce_ms)
    }
}
