//! Hierarchy, constellation and folder graphs over the relationship index

pub mod builder;
pub mod constellation;
pub mod filter;
pub mod folder;
pub mod graph;
pub mod hierarchy;
pub mod model;
pub mod strategy;
pub mod view;


pub use builder::GraphBuilder;
pub use filter::{PropertyFilter, apply_filters};
pub use graph::Graph;
pub use model::{
    BuildOptions, ConstellationInfo, Filters, FrontmatterPredicate, GraphEdge, GraphMode,
    GraphNode,
};
pub use strategy::{FrontmatterHierarchy, HierarchyStrategy, ListHierarchy};
pub use view::RelationView;
