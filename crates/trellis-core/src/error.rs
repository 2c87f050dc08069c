//! Error types shared across the workspace

use std::path::PathBuf;

use thiserror::Error;

use crate::model::DocumentId;

/// A cross-reference or frontmatter value that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty link")]
    Empty,
    #[error("unbalanced brackets in link `{0}`")]
    Unbalanced(String),
    #[error("link `{0}` points outside the vault")]
    External(String),
    #[error("link `{0}` has no target")]
    MissingTarget(String),
    #[error("unsupported value for a link: {0}")]
    Unsupported(String),
}

/// Failure reading a document from a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {id}: {source}")]
    Read {
        id: DocumentId,
        #[source]
        source: std::io::Error,
    },
    #[error("document {0} is not readable")]
    Unavailable(DocumentId),
}

/// Invalid or unreadable settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
