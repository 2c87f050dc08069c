//! Related modes: constellations of related documents
//!
//! Each expanded document is the center of a constellation made of its
//! related documents (its orbitals). Centers are expanded breadth-first, and
//! edges only ever point from a center to one of its orbitals, so the graph
//! stays acyclic even though `related` is symmetric.

use std::collections::{HashSet, VecDeque};

use trellis_core::DocumentId;

use crate::graph::Graph;
use crate::model::{ConstellationInfo, GraphNode};
use crate::view::RelationView;

/// Build constellations around `root`, expanding centers below level `max_depth`.
///
/// With `max_depth == 1` this is the root and its immediate related set.
/// A document reached as an orbital of several centers keeps the first
/// membership it was given.
pub fn build_constellation(view: &RelationView, root: &DocumentId, max_depth: usize) -> Graph {
    let max_depth = max_depth.max(1);

    let mut graph = Graph::new();
    let mut root_node = GraphNode::new(root.clone(), 0).root(true);
    root_node.constellation = Some(ConstellationInfo::default());
    graph.add_node(root_node);

    let mut expanded: HashSet<DocumentId> = HashSet::new();
    let mut queue = VecDeque::from([(root.clone(), 0usize)]);
    let mut next_center = 0;

    while let Some((center, level)) = queue.pop_front() {
        if level >= max_depth || !expanded.insert(center.clone()) {
            continue;
        }

        let center_index = next_center;
        next_center += 1;
        if let Some(node) = graph.node_mut(&center) {
            let info = node.constellation.get_or_insert_with(ConstellationInfo::default);
            info.is_center = true;
            info.center_index = Some(center_index);
        }

        let orbitals: Vec<&DocumentId> = view
            .related(&center)
            .iter()
            .filter(|other| *other != &center && !expanded.contains(*other))
            .collect();
        let orbital_count = orbitals.len();

        for (orbital_index, orbital) in orbitals.into_iter().enumerate() {
            let mut node = GraphNode::new(orbital.clone(), level + 1);
            node.constellation = Some(ConstellationInfo {
                level: level + 1,
                member_of: Some(center_index),
                orbital_index: Some(orbital_index),
                orbital_count: Some(orbital_count),
                ..ConstellationInfo::default()
            });
            graph.add_node(node);
            graph.add_edge(&center, orbital, false);
            queue.push_back((orbital.clone(), level + 1));
        }
    }

    graph
}
