//! Relationship extraction from document frontmatter

use chrono::{DateTime, Utc};
use serde_json::Value;
use trellis_core::link;
use trellis_core::{
    DocumentId, Frontmatter, LinkReference, PropertyBindings, RelationshipKind, RelationshipRecord,
};

/// Identity and timestamp of the document being extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub id: DocumentId,
    pub modified_at: DateTime<Utc>,
}

impl DocumentMeta {
    pub fn new(id: DocumentId, modified_at: DateTime<Utc>) -> Self {
        DocumentMeta { id, modified_at }
    }
}

/// Reads the configured relationship properties out of frontmatter.
#[derive(Debug, Clone, Default)]
pub struct RelationshipExtractor {
    bindings: PropertyBindings,
}

impl RelationshipExtractor {
    pub fn new(bindings: PropertyBindings) -> Self {
        RelationshipExtractor { bindings }
    }

    pub fn bindings(&self) -> &PropertyBindings {
        &self.bindings
    }

    /// Build the record for one document. Malformed entries are dropped.
    pub fn extract(&self, doc: &DocumentMeta, frontmatter: &Frontmatter) -> RelationshipRecord {
        let mut record = RelationshipRecord::empty(doc.id.clone(), doc.modified_at);
        for kind in RelationshipKind::ALL {
            let property = self.bindings.property(kind);
            if let Some(value) = frontmatter.get(property) {
                *record.links_mut(kind) = parse_links(value);
            }
        }
        record
    }
}

/// Normalize a property value to a list of links: null is empty, a scalar is a
/// singleton, a list is taken element-wise.
pub fn parse_links(value: &Value) -> Vec<LinkReference> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter_map(parse_entry).collect(),
        scalar => parse_entry(scalar).into_iter().collect(),
    }
}

fn parse_entry(value: &Value) -> Option<LinkReference> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        // Unquoted `[[Note]]` in YAML parses as nested single-element lists.
        Value::Array(inner) => match inner.as_slice() {
            [Value::String(s)] => format!("[[{}]]", s),
            [Value::Array(innermost)] => match innermost.as_slice() {
                [Value::String(s)] => format!("[[{}]]", s),
                _ => return None,
            },
            _ => return None,
        },
        _ => return None,
    };
    match link::parse(&text) {
        Ok(link) => Some(link),
        Err(e) => {
            tracing::trace!("Dropping malformed link {:?}: {}", text, e);
            None
        }
    }
}
