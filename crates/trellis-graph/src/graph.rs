//! Graph wrapper using petgraph::StableDiGraph keyed by DocumentId

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde::ser::{Serialize, Serializer};
use trellis_core::DocumentId;

use crate::model::{GraphEdge, GraphNode};

/// A relationship graph: nodes unique by document, edges between existing nodes.
pub struct Graph {
    inner: StableDiGraph<GraphNode, GraphEdge>,
    index: HashMap<DocumentId, NodeIndex>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            inner: StableDiGraph::new(),
            index: HashMap::new(),
        }
    }

    /// Add a node unless its document is already present. Returns whether it was added.
    pub fn add_node(&mut self, node: GraphNode) -> bool {
        if self.index.contains_key(&node.id) {
            return false;
        }
        let id = node.id.clone();
        let idx = self.inner.add_node(node);
        self.index.insert(id, idx);
        true
    }

    /// Add an edge between two existing nodes. Duplicates and dangling edges are refused.
    pub fn add_edge(&mut self, source: &DocumentId, target: &DocumentId, indirect: bool) -> bool {
        let (Some(&from), Some(&to)) = (self.index.get(source), self.index.get(target)) else {
            return false;
        };
        if self.inner.find_edge(from, to).is_some() {
            return false;
        }
        let edge = GraphEdge {
            source: source.clone(),
            target: target.clone(),
            indirect,
        };
        self.inner.add_edge(from, to, edge);
        true
    }

    /// Get a node by document.
    pub fn node(&self, id: &DocumentId) -> Option<&GraphNode> {
        self.index
            .get(id)
            .and_then(|&idx| self.inner.node_weight(idx))
    }

    /// Get a mutable node by document.
    pub fn node_mut(&mut self, id: &DocumentId) -> Option<&mut GraphNode> {
        let idx = *self.index.get(id)?;
        self.inner.node_weight_mut(idx)
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.index.contains_key(id)
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Iterate over all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx))
    }

    /// Apply `f` to every node in insertion order.
    pub fn update_nodes(&mut self, mut f: impl FnMut(&mut GraphNode)) {
        let indices: Vec<NodeIndex> = self.inner.node_indices().collect();
        for idx in indices {
            if let Some(node) = self.inner.node_weight_mut(idx) {
                f(node);
            }
        }
    }

    /// Iterate over all edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.inner
            .edge_indices()
            .filter_map(move |idx| self.inner.edge_weight(idx))
    }

    /// Documents reachable over one outgoing edge.
    pub fn successors(&self, id: &DocumentId) -> Vec<&DocumentId> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        self.inner
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge_ref| &edge_ref.weight().target)
            .collect()
    }

    /// Check for an edge from `source` to `target`.
    pub fn has_edge(&self, source: &DocumentId, target: &DocumentId) -> bool {
        match (self.index.get(source), self.index.get(target)) {
            (Some(&from), Some(&to)) => self.inner.find_edge(from, to).is_some(),
            _ => false,
        }
    }

    /// Check for an edge between two nodes in either direction.
    pub fn has_edge_between(&self, a: &DocumentId, b: &DocumentId) -> bool {
        self.has_edge(a, b) || self.has_edge(b, a)
    }

    /// Copy another graph's nodes and edges into this one, tagging new nodes with `group`.
    ///
    /// Nodes already present keep their attributes.
    pub fn merge(&mut self, other: Graph, group: usize) {
        for node in other.nodes() {
            let mut node = node.clone();
            node.group = Some(group);
            self.add_node(node);
        }
        for edge in other.edges() {
            self.add_edge(&edge.source, &edge.target, edge.indirect);
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for Graph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(serde::Serialize)]
        struct Wire<'a> {
            nodes: Vec<&'a GraphNode>,
            edges: Vec<&'a GraphEdge>,
        }

        Wire {
            nodes: self.nodes().collect(),
            edges: self.edges().collect(),
        }
        .serialize(serializer)
    }
}
