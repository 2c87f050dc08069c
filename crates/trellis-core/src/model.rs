//! Core data structures for the relationship index

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parsed YAML frontmatter of a document, normalized to JSON values.
pub type Frontmatter = BTreeMap<String, serde_json::Value>;

/// Extension of documents that take part in the relationship graph.
pub const DOCUMENT_EXTENSION: &str = "md";

/// Stable identifier of a document: its vault-relative path with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(path: impl Into<String>) -> Self {
        let path: String = path.into();
        let normalized = path.replace('\\', "/");
        DocumentId(normalized.trim_start_matches("./").trim_start_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name without directories or extension.
    pub fn stem(&self) -> &str {
        let name = self.0.rsplit('/').next().unwrap_or(&self.0);
        match name.rfind('.') {
            Some(dot) if dot > 0 => &name[..dot],
            _ => name,
        }
    }

    /// Full path minus the trailing `.md`, the form links use.
    pub fn without_extension(&self) -> &str {
        self.0.strip_suffix(".md").unwrap_or(&self.0)
    }

    /// Containing folder, empty for documents at the vault root.
    pub fn folder(&self) -> &str {
        match self.0.rfind('/') {
            Some(slash) => &self.0[..slash],
            None => "",
        }
    }

    /// Whether this document is a markdown document.
    pub fn is_document(&self) -> bool {
        let name = self.0.rsplit('/').next().unwrap_or(&self.0);
        name.rsplit_once('.')
            .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
    }

    /// True if this path equals `folder` or is nested anywhere below it.
    pub fn is_under(&self, folder: &str) -> bool {
        let folder = folder.trim_end_matches('/');
        if folder.is_empty() {
            return true;
        }
        self.0 == folder
            || (self.0.starts_with(folder) && self.0.as_bytes().get(folder.len()) == Some(&b'/'))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        DocumentId::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        DocumentId::new(value)
    }
}

/// A parsed cross-reference to another document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkReference {
    /// Target path without extension, heading or block suffix.
    pub target: String,
    pub alias: Option<String>,
}

impl LinkReference {
    pub fn new(target: impl Into<String>) -> Self {
        LinkReference {
            target: target.into(),
            alias: None,
        }
    }

    pub fn with_alias(target: impl Into<String>, alias: impl Into<String>) -> Self {
        LinkReference {
            target: target.into(),
            alias: Some(alias.into()),
        }
    }

    /// Last path segment of the target.
    pub fn target_stem(&self) -> &str {
        self.target.rsplit('/').next().unwrap_or(&self.target)
    }

    /// Whether this link textually points at `id`, either by full path or by file stem.
    pub fn points_at(&self, id: &DocumentId) -> bool {
        if self.target == id.without_extension() {
            return true;
        }
        !self.target.contains('/') && self.target == id.stem()
    }

    /// Whether this link, written in a document inside `folder`, names `id`
    /// by a path relative to that folder.
    pub fn points_at_from(&self, folder: &str, id: &DocumentId) -> bool {
        if folder.is_empty() {
            return false;
        }
        id.without_extension()
            .strip_prefix(folder)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|relative| relative == self.target)
    }
}

/// The three kinds of declared relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Parent,
    Children,
    Related,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 3] = [
        RelationshipKind::Parent,
        RelationshipKind::Children,
        RelationshipKind::Related,
    ];
}

/// Declared relationships of one document. Replaced wholesale on recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: DocumentId,
    pub modified_at: DateTime<Utc>,
    pub parents: Vec<LinkReference>,
    pub children: Vec<LinkReference>,
    pub related: Vec<LinkReference>,
}

impl RelationshipRecord {
    pub fn empty(id: DocumentId, modified_at: DateTime<Utc>) -> Self {
        RelationshipRecord {
            id,
            modified_at,
            parents: Vec::new(),
            children: Vec::new(),
            related: Vec::new(),
        }
    }

    pub fn links(&self, kind: RelationshipKind) -> &[LinkReference] {
        match kind {
            RelationshipKind::Parent => &self.parents,
            RelationshipKind::Children => &self.children,
            RelationshipKind::Related => &self.related,
        }
    }

    pub fn links_mut(&mut self, kind: RelationshipKind) -> &mut Vec<LinkReference> {
        match kind {
            RelationshipKind::Parent => &mut self.parents,
            RelationshipKind::Children => &mut self.children,
            RelationshipKind::Related => &mut self.related,
        }
    }

    /// Iterate every declared link regardless of kind.
    pub fn all_links(&self) -> impl Iterator<Item = &LinkReference> {
        self.parents
            .iter()
            .chain(self.children.iter())
            .chain(self.related.iter())
    }

    pub fn link_count(&self) -> usize {
        self.parents.len() + self.children.len() + self.related.len()
    }

    /// Whether any declared link refers to `id` by vault path, by a path
    /// relative to this document's folder, or by file stem.
    pub fn references(&self, id: &DocumentId) -> bool {
        let folder = self.id.folder();
        self.all_links()
            .any(|link| link.points_at(id) || link.points_at_from(folder, id))
    }

    /// Compare declared relationships, ignoring the modification time.
    pub fn same_relationships(&self, other: &RelationshipRecord) -> bool {
        self.parents == other.parents
            && self.children == other.children
            && self.related == other.related
    }
}

/// Kind of externally visible change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Changed,
    Deleted,
}

/// One notification per settled mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub id: DocumentId,
    pub before: Option<Arc<RelationshipRecord>>,
    pub after: Option<Arc<RelationshipRecord>>,
}

impl ChangeEvent {
    pub fn changed(
        id: DocumentId,
        before: Option<Arc<RelationshipRecord>>,
        after: Arc<RelationshipRecord>,
    ) -> Self {
        ChangeEvent {
            kind: ChangeKind::Changed,
            id,
            before,
            after: Some(after),
        }
    }

    pub fn deleted(id: DocumentId, before: Option<Arc<RelationshipRecord>>) -> Self {
        ChangeEvent {
            kind: ChangeKind::Deleted,
            id,
            before,
            after: None,
        }
    }
}

/// Raw mutation reported by a document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Created(DocumentId),
    Modified(DocumentId),
    Deleted(DocumentId),
    Renamed { from: DocumentId, to: DocumentId },
}

impl StoreEvent {
    /// The path the event is about after it applies.
    pub fn path(&self) -> &DocumentId {
        match self {
            StoreEvent::Created(id) | StoreEvent::Modified(id) | StoreEvent::Deleted(id) => id,
            StoreEvent::Renamed { to, .. } => to,
        }
    }
}
