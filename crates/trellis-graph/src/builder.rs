//! Graph construction from the relationship index

use std::sync::Arc;

use tracing::debug;
use trellis_core::{
    DocumentId, DocumentStore, Frontmatter, HierarchySource, RelationshipLookup, Settings,
};

use crate::constellation::build_constellation;
use crate::filter::apply_filters;
use crate::folder::build_folder;
use crate::graph::Graph;
use crate::hierarchy::build_hierarchy;
use crate::model::{BuildOptions, GraphMode, GraphNode};
use crate::strategy::{FrontmatterHierarchy, HierarchyStrategy, ListHierarchy};
use crate::view::RelationView;

/// Builds graphs on demand from the cached relationships.
///
/// Every call works on a fresh snapshot and allocates its own graph. The
/// only state is an optional depth override, which stays in force until the
/// caller resets it.
pub struct GraphBuilder {
    lookup: Arc<dyn RelationshipLookup>,
    store: Arc<dyn DocumentStore>,
    settings: Settings,
    depth_override: Option<usize>,
}

impl GraphBuilder {
    pub fn new(
        lookup: Arc<dyn RelationshipLookup>,
        store: Arc<dyn DocumentStore>,
        settings: Settings,
    ) -> Self {
        GraphBuilder {
            lookup,
            store,
            settings,
            depth_override: None,
        }
    }

    /// Replace both maximum depths until called again with `None`.
    pub fn set_depth_override(&mut self, depth: Option<usize>) {
        self.depth_override = depth;
    }

    pub fn depth_override(&self) -> Option<usize> {
        self.depth_override
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn hierarchy_depth(&self) -> usize {
        self.depth_override
            .unwrap_or(self.settings.hierarchy_max_depth)
    }

    fn constellation_depth(&self) -> usize {
        self.depth_override
            .unwrap_or(self.settings.constellation_max_depth)
    }

    pub fn build_graph(&self, options: &BuildOptions) -> Graph {
        let records = self.lookup.snapshot();
        let view = RelationView::build(&records);
        let root = &options.root;

        let list;
        let frontmatter;
        let strategy: &dyn HierarchyStrategy = match &self.settings.hierarchy_source {
            HierarchySource::Frontmatter => {
                frontmatter = FrontmatterHierarchy::new(
                    &view,
                    self.store.as_ref(),
                    self.settings.prioritize_parent_property.as_deref(),
                );
                &frontmatter
            }
            HierarchySource::List(outline) => {
                list = ListHierarchy::from_store(
                    self.store.as_ref(),
                    &DocumentId::new(outline.as_str()),
                    view.known(),
                );
                &list
            }
        };

        let mut graph = match options.mode {
            GraphMode::Hierarchy => build_hierarchy(strategy, root, self.hierarchy_depth()),
            GraphMode::Related => build_constellation(&view, root, 1),
            GraphMode::RelatedAll => build_constellation(&view, root, self.constellation_depth()),
            GraphMode::FolderHierarchy => build_folder(&view, root, |seed| {
                build_hierarchy(strategy, seed, self.hierarchy_depth())
            }),
            GraphMode::FolderRelated => build_folder(&view, root, |seed| {
                build_constellation(&view, seed, self.constellation_depth())
            }),
        };

        let store = &self.store;
        graph.update_nodes(|node| node.label = store.display_name(&node.id));

        let filters = &options.filters;
        if filters.is_active() {
            let maintain = filters
                .maintain_indirect
                .unwrap_or(self.settings.maintain_indirect_connections);
            let keep = |node: &GraphNode| match &filters.predicate {
                Some(predicate) => predicate(&self.frontmatter_of(&node.id)),
                None => true,
            };
            graph = apply_filters(&graph, root, filters.search.as_deref(), &keep, maintain);
        }

        debug!(
            "Built {:?} graph for {}: {} nodes, {} edges",
            options.mode,
            root,
            graph.node_count(),
            graph.edge_count()
        );
        graph
    }

    fn frontmatter_of(&self, id: &DocumentId) -> Frontmatter {
        match self.store.read_frontmatter(id) {
            Ok(frontmatter) => frontmatter.unwrap_or_default(),
            Err(e) => {
                debug!("Filtering {} without frontmatter: {}", id, e);
                Frontmatter::new()
            }
        }
    }
}
