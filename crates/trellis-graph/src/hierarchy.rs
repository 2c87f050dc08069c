//! Hierarchy mode: a parent/child tree around the root's topmost ancestor

use std::collections::{HashSet, VecDeque};

use trellis_core::DocumentId;

use crate::graph::Graph;
use crate::model::GraphNode;
use crate::strategy::HierarchyStrategy;

/// Walk up from `root` and return the deepest ancestor found.
///
/// Every document is visited at most once, so parent cycles terminate. When
/// a document has several parents and a preferred one is among them, only
/// that one is followed. Ties in depth go to the ancestor discovered first.
pub fn find_topmost(strategy: &dyn HierarchyStrategy, root: &DocumentId) -> DocumentId {
    let mut visited: HashSet<DocumentId> = HashSet::new();
    let mut stack: Vec<(DocumentId, usize)> = vec![(root.clone(), 0)];
    let mut topmost = (root.clone(), 0);

    while let Some((id, depth)) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        if depth > topmost.1 {
            topmost = (id.clone(), depth);
        }

        let parents = strategy.parents(&id);
        let preferred = if parents.len() > 1 {
            strategy
                .preferred_parent(&id)
                .filter(|preferred| parents.contains(preferred))
        } else {
            None
        };
        match preferred {
            Some(parent) => stack.push((parent, depth + 1)),
            // Reversed so the first declared parent is explored first.
            None => stack.extend(
                parents
                    .iter()
                    .rev()
                    .filter(|parent| !visited.contains(*parent))
                    .map(|parent| (parent.clone(), depth + 1)),
            ),
        }
    }

    topmost.0
}

/// Build the tree below the topmost ancestor of `root`.
///
/// Nodes get their breadth-first distance from the top as depth; no node is
/// placed at `max_depth` or beyond.
pub fn build_hierarchy(
    strategy: &dyn HierarchyStrategy,
    root: &DocumentId,
    max_depth: usize,
) -> Graph {
    let max_depth = max_depth.max(1);
    let top = find_topmost(strategy, root);

    let mut graph = Graph::new();
    graph.add_node(GraphNode::new(top.clone(), 0).root(&top == root));
    let mut queue = VecDeque::from([(top, 0usize)]);

    while let Some((id, depth)) = queue.pop_front() {
        if depth + 1 >= max_depth {
            continue;
        }
        for child in strategy.children(&id) {
            if graph.add_node(GraphNode::new(child.clone(), depth + 1).root(child == root)) {
                queue.push_back((child.clone(), depth + 1));
                graph.add_edge(&id, child, false);
            } else if graph.node(child).is_some_and(|n| n.depth > depth) {
                // Second parent of a node already placed deeper in the tree.
                graph.add_edge(&id, child, false);
            }
        }
    }

    graph
}
