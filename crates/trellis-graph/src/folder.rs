//! Folder modes: one build per independent root inside a folder

use std::collections::HashSet;

use tracing::debug;
use trellis_core::DocumentId;

use crate::graph::Graph;
use crate::view::RelationView;

/// Merge one build per document under the folder of `folder_root`.
///
/// Documents already absorbed by an earlier build do not seed their own.
/// Each build's new nodes are tagged with the build's group index and its
/// seed is flagged as a root.
pub fn build_folder<F>(view: &RelationView, folder_root: &DocumentId, mut build: F) -> Graph
where
    F: FnMut(&DocumentId) -> Graph,
{
    let folder = folder_root.folder();
    let seeds: Vec<&DocumentId> = view
        .known()
        .iter()
        .filter(|id| *id != folder_root && id.is_under(folder))
        .collect();

    let mut merged = Graph::new();
    let mut absorbed: HashSet<DocumentId> = HashSet::new();
    let mut group = 0;

    for seed in seeds {
        if absorbed.contains(seed) {
            continue;
        }
        let mut part = build(seed);
        if let Some(node) = part.node_mut(seed) {
            node.is_root = true;
        }
        absorbed.extend(part.nodes().map(|node| node.id.clone()));
        merged.merge(part, group);
        group += 1;
    }

    debug!(
        "Folder '{}' produced {} groups with {} nodes",
        folder,
        group,
        merged.node_count()
    );
    merged
}
