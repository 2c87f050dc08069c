//! Node, edge and request types of a built graph

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use trellis_core::{DocumentId, Frontmatter};

/// How a graph is grown from its root document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GraphMode {
    /// Parent/child tree around the root's topmost ancestor.
    #[default]
    Hierarchy,
    /// The root and its directly related documents.
    Related,
    /// Recursive constellations of related documents.
    RelatedAll,
    /// One hierarchy per independent root in the root's folder.
    FolderHierarchy,
    /// One constellation per independent root in the root's folder.
    FolderRelated,
}

impl GraphMode {
    pub const ALL: [GraphMode; 5] = [
        GraphMode::Hierarchy,
        GraphMode::Related,
        GraphMode::RelatedAll,
        GraphMode::FolderHierarchy,
        GraphMode::FolderRelated,
    ];

    pub fn is_folder(&self) -> bool {
        matches!(self, GraphMode::FolderHierarchy | GraphMode::FolderRelated)
    }

    /// Kebab-case name, as accepted on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            GraphMode::Hierarchy => "hierarchy",
            GraphMode::Related => "related",
            GraphMode::RelatedAll => "related-all",
            GraphMode::FolderHierarchy => "folder-hierarchy",
            GraphMode::FolderRelated => "folder-related",
        }
    }
}

impl fmt::Display for GraphMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GraphMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        GraphMode::ALL
            .into_iter()
            .find(|mode| mode.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = GraphMode::ALL.iter().map(GraphMode::name).collect();
                format!("unknown mode `{}`, expected one of: {}", s, names.join(", "))
            })
    }
}

/// Constellation role of a node, consumed by radial layouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConstellationInfo {
    /// Whether the node was expanded as the center of its own constellation.
    pub is_center: bool,
    /// Index of the constellation this node is the center of.
    pub center_index: Option<usize>,
    /// Distance from the root constellation.
    pub level: usize,
    /// Constellation this node first orbited.
    pub member_of: Option<usize>,
    pub orbital_index: Option<usize>,
    pub orbital_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: DocumentId,
    pub label: String,
    pub depth: usize,
    pub is_root: bool,
    /// Build index in folder modes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constellation: Option<ConstellationInfo>,
}

impl GraphNode {
    pub fn new(id: DocumentId, depth: usize) -> Self {
        GraphNode {
            label: id.stem().to_string(),
            id,
            depth,
            is_root: false,
            group: None,
            constellation: None,
        }
    }

    pub fn root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: DocumentId,
    pub target: DocumentId,
    /// Synthetic edge standing in for a path through filtered-out nodes.
    pub indirect: bool,
}

/// Caller-supplied test over a document's frontmatter.
pub type FrontmatterPredicate = Arc<dyn Fn(&Frontmatter) -> bool + Send + Sync>;

/// Post-build filtering applied to every mode.
#[derive(Clone, Default)]
pub struct Filters {
    /// Case-insensitive substring the node label must contain.
    pub search: Option<String>,
    pub predicate: Option<FrontmatterPredicate>,
    /// Overrides `maintain_indirect_connections` from the settings.
    pub maintain_indirect: Option<bool>,
}

impl Filters {
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Frontmatter) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn maintain_indirect(mut self, maintain: bool) -> Self {
        self.maintain_indirect = Some(maintain);
        self
    }

    /// Whether any node could be filtered out.
    pub fn is_active(&self) -> bool {
        self.search.as_deref().is_some_and(|s| !s.trim().is_empty()) || self.predicate.is_some()
    }
}

impl fmt::Debug for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filters")
            .field("search", &self.search)
            .field("predicate", &self.predicate.is_some())
            .field("maintain_indirect", &self.maintain_indirect)
            .finish()
    }
}

/// A single graph request.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub root: DocumentId,
    pub mode: GraphMode,
    pub filters: Filters,
}

impl BuildOptions {
    pub fn new(root: impl Into<DocumentId>, mode: GraphMode) -> Self {
        BuildOptions {
            root: root.into(),
            mode,
            filters: Filters::default(),
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }
}
