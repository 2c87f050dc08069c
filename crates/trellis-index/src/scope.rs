//! Scan-scope filtering

use trellis_core::{DocumentId, SCAN_ALL};

/// Directory allow-list deciding which documents are indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanScope {
    scan_all: bool,
    directories: Vec<String>,
}

impl ScanScope {
    pub fn new(directories: &[String]) -> Self {
        let scan_all = directories.iter().any(|d| d.trim() == SCAN_ALL);
        let directories = directories
            .iter()
            .map(|d| d.trim().trim_start_matches("./").trim_matches('/').to_string())
            .filter(|d| !d.is_empty() && d != SCAN_ALL)
            .collect();
        ScanScope {
            scan_all,
            directories,
        }
    }

    /// True if the path equals or is nested under an allowed directory.
    pub fn is_in_scope(&self, path: &DocumentId) -> bool {
        self.scan_all || self.directories.iter().any(|dir| path.is_under(dir))
    }

    /// In scope and a markdown document: the only paths the pipeline sees.
    pub fn qualifies(&self, path: &DocumentId) -> bool {
        path.is_document() && self.is_in_scope(path)
    }
}
