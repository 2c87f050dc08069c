//! Resolved, symmetric view of the relationship cache
//!
//! Records only hold what each document declares. The view resolves every
//! link once against the indexed documents and adds the implied reverse
//! relations: a document listing `X` as parent is one of `X`'s children, and
//! `related` works both ways. Declared entries come first, reverse entries
//! follow in path order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use trellis_core::link;
use trellis_core::{DocumentId, LinkReference, RelationshipRecord};

#[derive(Debug, Clone, Default)]
struct Relations {
    parents: Vec<DocumentId>,
    children: Vec<DocumentId>,
    related: Vec<DocumentId>,
}

#[derive(Debug, Default)]
pub struct RelationView {
    known: BTreeSet<DocumentId>,
    relations: HashMap<DocumentId, Relations>,
}

impl RelationView {
    pub fn build(records: &[Arc<RelationshipRecord>]) -> Self {
        let known: BTreeSet<DocumentId> = records.iter().map(|r| r.id.clone()).collect();

        let mut relations: HashMap<DocumentId, Relations> = HashMap::with_capacity(records.len());
        let mut reverse_children: BTreeMap<DocumentId, BTreeSet<DocumentId>> = BTreeMap::new();
        let mut reverse_parents: BTreeMap<DocumentId, BTreeSet<DocumentId>> = BTreeMap::new();
        let mut reverse_related: BTreeMap<DocumentId, BTreeSet<DocumentId>> = BTreeMap::new();

        for record in records {
            let id = &record.id;
            let declared = Relations {
                parents: resolve_all(&record.parents, id, &known),
                children: resolve_all(&record.children, id, &known),
                related: resolve_all(&record.related, id, &known),
            };
            for parent in &declared.parents {
                reverse_children
                    .entry(parent.clone())
                    .or_default()
                    .insert(id.clone());
            }
            for child in &declared.children {
                reverse_parents
                    .entry(child.clone())
                    .or_default()
                    .insert(id.clone());
            }
            for other in &declared.related {
                reverse_related
                    .entry(other.clone())
                    .or_default()
                    .insert(id.clone());
            }
            relations.insert(id.clone(), declared);
        }

        for (target, sources) in reverse_children {
            append_missing(&mut relations.entry(target).or_default().children, sources);
        }
        for (target, sources) in reverse_parents {
            append_missing(&mut relations.entry(target).or_default().parents, sources);
        }
        for (target, sources) in reverse_related {
            append_missing(&mut relations.entry(target).or_default().related, sources);
        }

        RelationView { known, relations }
    }

    /// Indexed documents in path order.
    pub fn known(&self) -> &BTreeSet<DocumentId> {
        &self.known
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.known.contains(id)
    }

    pub fn parents(&self, id: &DocumentId) -> &[DocumentId] {
        self.relations
            .get(id)
            .map(|r| r.parents.as_slice())
            .unwrap_or(&[])
    }

    pub fn children(&self, id: &DocumentId) -> &[DocumentId] {
        self.relations
            .get(id)
            .map(|r| r.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn related(&self, id: &DocumentId) -> &[DocumentId] {
        self.relations
            .get(id)
            .map(|r| r.related.as_slice())
            .unwrap_or(&[])
    }

    /// Resolve a single link as seen from `from`.
    pub fn resolve(&self, link: &LinkReference, from: &DocumentId) -> Option<DocumentId> {
        link::resolve(link, from, &self.known)
    }
}

/// Resolve links in order, dropping unresolvable targets, self-links and repeats.
fn resolve_all(
    links: &[LinkReference],
    from: &DocumentId,
    known: &BTreeSet<DocumentId>,
) -> Vec<DocumentId> {
    let mut resolved = Vec::with_capacity(links.len());
    for link in links {
        match link::resolve(link, from, known) {
            Some(target) if &target != from && !resolved.contains(&target) => {
                resolved.push(target)
            }
            Some(_) => {}
            None => tracing::trace!("Dropping unresolved link {} in {}", link.target, from),
        }
    }
    resolved
}

fn append_missing(list: &mut Vec<DocumentId>, sources: BTreeSet<DocumentId>) {
    for source in sources {
        if !list.contains(&source) {
            list.push(source);
        }
    }
}
