//! Document store backed by a vault directory on disk

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use trellis_core::frontmatter;
use trellis_core::{DocumentId, DocumentStore, Frontmatter, StoreError, StoreEvent};

use crate::watcher::{FileWatcher, Subscribers, should_ignore_path};

/// Markdown vault on disk. Ids are paths relative to the vault root.
pub struct VaultStore {
    root: PathBuf,
    subscribers: Arc<Subscribers>,
    watcher: Mutex<Option<FileWatcher>>,
}

impl VaultStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            bail!("vault root {} is not a directory", root.display());
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to resolve vault root {}", root.display()))?;
        Ok(VaultStore {
            root,
            subscribers: Arc::new(Subscribers::default()),
            watcher: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, id: &DocumentId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Start forwarding filesystem changes to subscribers. Idempotent.
    pub fn watch(&self) -> Result<()> {
        let mut slot = self.lock_watcher();
        if slot.is_some() {
            return Ok(());
        }
        let mut watcher = FileWatcher::new(&self.root, Arc::clone(&self.subscribers))?;
        watcher.watch_directory(&self.root)?;
        *slot = Some(watcher);
        info!("Watching vault {}", self.root.display());
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.lock_watcher().is_some()
    }

    /// Stop the filesystem watcher. Existing subscribers stay registered.
    pub fn unwatch(&self) {
        if self.lock_watcher().take().is_some() {
            info!("Stopped watching vault {}", self.root.display());
        }
    }

    /// Forward an event as if it came from the filesystem.
    pub fn notify(&self, event: StoreEvent) {
        self.subscribers.send(event);
    }

    fn read_text(&self, id: &DocumentId) -> io::Result<String> {
        std::fs::read_to_string(self.path_of(id))
    }

    fn lock_watcher(&self) -> std::sync::MutexGuard<'_, Option<FileWatcher>> {
        match self.watcher.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl DocumentStore for VaultStore {
    fn list_documents(&self) -> Vec<DocumentId> {
        let mut ids = Vec::new();
        let root = self.root.clone();
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .filter_entry(move |entry| {
                entry
                    .path()
                    .strip_prefix(&root)
                    .map_or(true, |relative| !should_ignore_path(relative))
            })
            .build();

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_some_and(|t| t.is_file()) {
                        continue;
                    }
                    if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                        let id = DocumentId::new(relative.to_string_lossy().into_owned());
                        if id.is_document() {
                            ids.push(id);
                        }
                    }
                }
                Err(e) => warn!("Skipping unreadable vault entry: {}", e),
            }
        }

        ids.sort();
        debug!("Listed {} documents under {}", ids.len(), self.root.display());
        ids
    }

    fn read_frontmatter(&self, id: &DocumentId) -> Result<Option<Frontmatter>, StoreError> {
        match self.read_text(id) {
            Ok(text) => Ok(frontmatter::parse_frontmatter(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                id: id.clone(),
                source,
            }),
        }
    }

    fn read_body(&self, id: &DocumentId) -> Option<String> {
        let text = self.read_text(id).ok()?;
        Some(frontmatter::body(&text).to_string())
    }

    fn modified_at(&self, id: &DocumentId) -> Option<DateTime<Utc>> {
        let modified = std::fs::metadata(self.path_of(id)).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }

    fn display_name(&self, id: &DocumentId) -> String {
        self.read_frontmatter(id)
            .ok()
            .flatten()
            .and_then(|fm| fm.get("title").and_then(|t| t.as_str()).map(str::to_string))
            .unwrap_or_else(|| id.stem().to_string())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        self.subscribers.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, path: &str, content: &str) {
        let full = dir.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }

    #[test]
    fn test_lists_markdown_documents() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.md", "---\nparent: \"[[b]]\"\n---\n");
        write(temp_dir.path(), "notes/b.md", "no frontmatter");
        write(temp_dir.path(), "notes/image.png", "");
        write(temp_dir.path(), ".obsidian/workspace.md", "");

        let store = VaultStore::open(temp_dir.path()).unwrap();
        assert_eq!(
            store.list_documents(),
            vec![DocumentId::from("a.md"), DocumentId::from("notes/b.md")]
        );
    }

    #[test]
    fn test_reads_frontmatter_and_body() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "a.md",
            "---\ntitle: Alpha\nrelated:\n  - \"[[b]]\"\n---\n# Body\n",
        );
        write(temp_dir.path(), "plain.md", "# Just text\n");
        let store = VaultStore::open(temp_dir.path()).unwrap();

        let fm = store.read_frontmatter(&"a.md".into()).unwrap().unwrap();
        assert_eq!(fm["related"][0], "[[b]]");
        assert_eq!(store.display_name(&"a.md".into()), "Alpha");
        assert_eq!(store.read_body(&"a.md".into()).unwrap(), "# Body\n");
        assert!(store.modified_at(&"a.md".into()).is_some());

        assert!(store.read_frontmatter(&"plain.md".into()).unwrap().is_none());
        assert_eq!(store.display_name(&"plain.md".into()), "plain");
        assert!(store.read_frontmatter(&"missing.md".into()).unwrap().is_none());
    }

    #[test]
    fn test_open_rejects_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        assert!(VaultStore::open(temp_dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_notify_reaches_subscribers() {
        let temp_dir = TempDir::new().unwrap();
        let store = VaultStore::open(temp_dir.path()).unwrap();
        let mut rx = store.subscribe();
        store.notify(StoreEvent::Modified("a.md".into()));
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Modified("a.md".into()));
    }
}
