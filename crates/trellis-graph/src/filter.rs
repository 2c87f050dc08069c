//! Post-build filtering with optional indirect reconnection

use std::collections::{HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use trellis_core::{DocumentId, Frontmatter};

use crate::graph::Graph;
use crate::model::{FrontmatterPredicate, GraphNode};

/// Keep the nodes whose label contains `search` (ignoring case) and that pass `keep`.
///
/// The root always survives and edges are kept only between survivors. With
/// `maintain_indirect`, a survivor that reached another survivor only through
/// removed nodes gets a synthetic edge marked `indirect`, unless the two are
/// already directly connected. The search for such paths never passes
/// through a surviving node.
pub fn apply_filters(
    graph: &Graph,
    root: &DocumentId,
    search: Option<&str>,
    keep: &dyn Fn(&GraphNode) -> bool,
    maintain_indirect: bool,
) -> Graph {
    let needle = search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let survivors: HashSet<&DocumentId> = graph
        .nodes()
        .filter(|node| {
            &node.id == root
                || (needle
                    .as_deref()
                    .is_none_or(|needle| node.label.to_lowercase().contains(needle))
                    && keep(node))
        })
        .map(|node| &node.id)
        .collect();

    let mut filtered = Graph::new();
    for node in graph.nodes().filter(|node| survivors.contains(&node.id)) {
        filtered.add_node(node.clone());
    }
    for edge in graph.edges() {
        if survivors.contains(&edge.source) && survivors.contains(&edge.target) {
            filtered.add_edge(&edge.source, &edge.target, edge.indirect);
        }
    }

    if maintain_indirect {
        for node in graph.nodes().filter(|node| survivors.contains(&node.id)) {
            for target in reachable_through_removed(graph, &node.id, &survivors) {
                if target != &node.id && !filtered.has_edge_between(&node.id, target) {
                    filtered.add_edge(&node.id, target, true);
                }
            }
        }
    }

    filtered
}

/// Survivors reachable from `start` over outgoing edges with only removed nodes in between.
fn reachable_through_removed<'g>(
    graph: &'g Graph,
    start: &DocumentId,
    survivors: &HashSet<&DocumentId>,
) -> Vec<&'g DocumentId> {
    let mut found = Vec::new();
    let mut visited: HashSet<&DocumentId> = HashSet::new();
    let mut queue: VecDeque<&DocumentId> = graph
        .successors(start)
        .into_iter()
        .filter(|next| !survivors.contains(next))
        .collect();

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current) {
            continue;
        }
        for next in graph.successors(current) {
            if survivors.contains(next) {
                if !found.contains(&next) {
                    found.push(next);
                }
            } else if !visited.contains(next) {
                queue.push_back(next);
            }
        }
    }

    found
}

/// `key=value` test against frontmatter, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyFilter {
    pub key: String,
    pub value: String,
}

impl PropertyFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        PropertyFilter {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether the property holds the value, directly or as a list element.
    ///
    /// Text compares case-insensitively and also matches a link to the value.
    pub fn matches(&self, frontmatter: &Frontmatter) -> bool {
        frontmatter
            .get(&self.key)
            .is_some_and(|value| value_matches(value, &self.value))
    }

    pub fn into_predicate(self) -> FrontmatterPredicate {
        Arc::new(move |frontmatter: &Frontmatter| self.matches(frontmatter))
    }
}

impl FromStr for PropertyFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("missing property name in '{}'", s));
        }
        Ok(PropertyFilter::new(key, value.trim()))
    }
}

fn value_matches(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(text) => {
            let text = text.trim();
            text.eq_ignore_ascii_case(expected)
                || text
                    .strip_prefix("[[")
                    .and_then(|t| t.strip_suffix("]]"))
                    .and_then(|t| t.split('|').next())
                    .is_some_and(|target| target.trim().eq_ignore_ascii_case(expected))
        }
        Value::Array(items) => items.iter().any(|item| value_matches(item, expected)),
        Value::Bool(flag) => flag.to_string() == expected.to_ascii_lowercase(),
        Value::Number(number) => number.to_string() == expected,
        Value::Null => expected.is_empty(),
        Value::Object(_) => false,
    }
}
