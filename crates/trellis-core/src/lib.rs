//! Trellis core: document model, link codec, frontmatter and settings

pub mod config;
pub mod error;
pub mod frontmatter;
pub mod link;
pub mod model;
pub mod store;


pub use config::{HierarchySource, PropertyBindings, Settings, CONFIG_FILE, SCAN_ALL};
pub use error::{ConfigError, ParseError, StoreError};
pub use model::{
    ChangeEvent, ChangeKind, DocumentId, Frontmatter, LinkReference, RelationshipKind,
    RelationshipRecord, StoreEvent,
};
pub use store::{DocumentStore, MemoryStore, RelationshipLookup};
