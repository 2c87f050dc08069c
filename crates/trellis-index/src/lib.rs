//! Relationship extraction and the incrementally maintained relationship index

pub mod debounce;
pub mod extractor;
pub mod index;
mod pipeline;
pub mod scan;
pub mod scope;

#[cfg(test)]
pub mod tests;

pub use extractor::{DocumentMeta, RelationshipExtractor, parse_links};
pub use index::RelationshipIndex;
pub use scan::ScanStats;
pub use scope::ScanScope;
