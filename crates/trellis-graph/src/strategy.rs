//! Sources of the parent/child hierarchy
//!
//! Hierarchy mode only needs to walk up and down a tree. Where that tree
//! comes from is a [`HierarchyStrategy`]: the `parent`/`children`
//! frontmatter of every document, or a nested bullet list of links kept in
//! one outline document.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace};
use trellis_core::link;
use trellis_core::{DocumentId, DocumentStore};
use trellis_index::parse_links;

use crate::view::RelationView;

pub trait HierarchyStrategy {
    fn parents(&self, id: &DocumentId) -> &[DocumentId];

    fn children(&self, id: &DocumentId) -> &[DocumentId];

    /// The one parent to follow upward when a document has several.
    fn preferred_parent(&self, _id: &DocumentId) -> Option<DocumentId> {
        None
    }
}

/// Hierarchy declared through frontmatter properties.
pub struct FrontmatterHierarchy<'a> {
    view: &'a RelationView,
    store: &'a dyn DocumentStore,
    prioritize: Option<&'a str>,
}

impl<'a> FrontmatterHierarchy<'a> {
    pub fn new(
        view: &'a RelationView,
        store: &'a dyn DocumentStore,
        prioritize: Option<&'a str>,
    ) -> Self {
        FrontmatterHierarchy {
            view,
            store,
            prioritize,
        }
    }
}

impl HierarchyStrategy for FrontmatterHierarchy<'_> {
    fn parents(&self, id: &DocumentId) -> &[DocumentId] {
        self.view.parents(id)
    }

    fn children(&self, id: &DocumentId) -> &[DocumentId] {
        self.view.children(id)
    }

    fn preferred_parent(&self, id: &DocumentId) -> Option<DocumentId> {
        let property = self.prioritize?;
        let frontmatter = match self.store.read_frontmatter(id) {
            Ok(frontmatter) => frontmatter?,
            Err(e) => {
                debug!("No prioritized parent for {}: {}", id, e);
                return None;
            }
        };
        let link = parse_links(frontmatter.get(property)?).into_iter().next()?;
        self.view.resolve(&link, id)
    }
}

/// Hierarchy read from a nested bullet list in one outline document.
///
/// ```text
/// - [[Projects]]
///   - [[Alpha]]
///   - [[Beta]]
/// ```
#[derive(Debug, Default)]
pub struct ListHierarchy {
    parents: HashMap<DocumentId, Vec<DocumentId>>,
    children: HashMap<DocumentId, Vec<DocumentId>>,
}

/// Columns a tab counts for when measuring indentation.
const TAB_WIDTH: usize = 4;

impl ListHierarchy {
    /// Parse the outline stored in `outline`, resolving items among `known`.
    pub fn from_store(
        store: &dyn DocumentStore,
        outline: &DocumentId,
        known: &BTreeSet<DocumentId>,
    ) -> Self {
        match store.read_body(outline) {
            Some(body) => Self::parse(&body, outline, known),
            None => {
                debug!("Hierarchy outline {} is unavailable", outline);
                ListHierarchy::default()
            }
        }
    }

    pub fn parse(body: &str, outline: &DocumentId, known: &BTreeSet<DocumentId>) -> Self {
        let mut hierarchy = ListHierarchy::default();
        let mut stack: Vec<(usize, DocumentId)> = Vec::new();

        for line in body.lines() {
            let Some((indent, item)) = list_item(line) else {
                continue;
            };
            let Some(id) = item_link(item).and_then(|l| link::resolve(&l, outline, known)) else {
                trace!("Skipping outline item {:?}", item);
                continue;
            };

            while stack.last().is_some_and(|(depth, _)| *depth >= indent) {
                stack.pop();
            }
            if let Some((_, parent)) = stack.last() {
                if parent != &id {
                    push_unique(hierarchy.children.entry(parent.clone()).or_default(), &id);
                    push_unique(hierarchy.parents.entry(id.clone()).or_default(), parent);
                }
            }
            stack.push((indent, id));
        }

        hierarchy
    }
}

impl HierarchyStrategy for ListHierarchy {
    fn parents(&self, id: &DocumentId) -> &[DocumentId] {
        self.parents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn children(&self, id: &DocumentId) -> &[DocumentId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn push_unique(list: &mut Vec<DocumentId>, id: &DocumentId) {
    if !list.contains(id) {
        list.push(id.clone());
    }
}

/// Split a bullet line into its indentation width and item text.
fn list_item(line: &str) -> Option<(usize, &str)> {
    let content = line.trim_start();
    let indent: usize = line[..line.len() - content.len()]
        .chars()
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum();

    let rest = ["- ", "* ", "+ "]
        .iter()
        .find_map(|marker| content.strip_prefix(marker))
        .or_else(|| {
            let digits = content.chars().take_while(|c| c.is_ascii_digit()).count();
            if digits == 0 {
                return None;
            }
            let after = &content[digits..];
            after.strip_prefix(". ").or_else(|| after.strip_prefix(") "))
        })?;

    let rest = rest.trim();
    let rest = ["[ ] ", "[x] ", "[X] "]
        .iter()
        .find_map(|checkbox| rest.strip_prefix(checkbox))
        .unwrap_or(rest);
    if rest.is_empty() {
        return None;
    }
    Some((indent, rest))
}

/// First link in an item: a wiki link, a markdown link, or the bare text.
fn item_link(item: &str) -> Option<trellis_core::LinkReference> {
    if let Some(start) = item.find("[[") {
        let end = item[start..].find("]]")? + start + 2;
        return link::parse(&item[start..end]).ok();
    }
    if item.starts_with('[') {
        if let Some(close) = item.find(')') {
            return link::parse(&item[..=close]).ok();
        }
    }
    link::parse(item).ok()
}
