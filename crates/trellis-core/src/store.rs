//! Document store and relationship lookup seams
//!
//! The index consumes a [`DocumentStore`]; the graph builder reads the index
//! back through [`RelationshipLookup`]. [`MemoryStore`] is an in-memory store
//! used by tests and by hosts that already hold their documents in memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::model::{DocumentId, Frontmatter, RelationshipRecord, StoreEvent};

/// Source of truth for documents and their mutations.
pub trait DocumentStore: Send + Sync {
    /// Every document currently in the store.
    fn list_documents(&self) -> Vec<DocumentId>;

    /// Parsed frontmatter, `Ok(None)` when the document has none (or does not exist).
    fn read_frontmatter(&self, id: &DocumentId) -> Result<Option<Frontmatter>, StoreError>;

    /// Body text without frontmatter.
    fn read_body(&self, _id: &DocumentId) -> Option<String> {
        None
    }

    fn modified_at(&self, _id: &DocumentId) -> Option<DateTime<Utc>> {
        None
    }

    /// Label shown for the document in a graph.
    fn display_name(&self, id: &DocumentId) -> String {
        id.stem().to_string()
    }

    /// Register for raw mutation events.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent>;
}

/// Read-only access to cached relationship records.
pub trait RelationshipLookup: Send + Sync {
    fn record(&self, id: &DocumentId) -> Option<Arc<RelationshipRecord>>;

    /// All records, in no particular order.
    fn snapshot(&self) -> Vec<Arc<RelationshipRecord>>;
}

impl RelationshipLookup for HashMap<DocumentId, Arc<RelationshipRecord>> {
    fn record(&self, id: &DocumentId) -> Option<Arc<RelationshipRecord>> {
        self.get(id).cloned()
    }

    fn snapshot(&self) -> Vec<Arc<RelationshipRecord>> {
        self.values().cloned().collect()
    }
}

#[derive(Debug, Clone)]
struct MemoryDocument {
    frontmatter: Option<Frontmatter>,
    body: String,
    modified_at: DateTime<Utc>,
    unreadable: bool,
}

/// In-memory document store that broadcasts its own mutations.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<DocumentId, MemoryDocument>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<StoreEvent>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a document, emitting `Created` or `Modified`.
    pub fn put(&self, id: impl Into<DocumentId>, frontmatter: Option<Frontmatter>) {
        self.put_with_body(id, frontmatter, "");
    }

    pub fn put_with_body(
        &self,
        id: impl Into<DocumentId>,
        frontmatter: Option<Frontmatter>,
        body: &str,
    ) {
        let id = id.into();
        let document = MemoryDocument {
            frontmatter,
            body: body.to_string(),
            modified_at: Utc::now(),
            unreadable: false,
        };
        let existed = self
            .write_documents()
            .insert(id.clone(), document)
            .is_some();
        if existed {
            self.emit(StoreEvent::Modified(id));
        } else {
            self.emit(StoreEvent::Created(id));
        }
    }

    /// Insert a document without notifying subscribers (initial vault contents).
    pub fn seed(&self, id: impl Into<DocumentId>, frontmatter: Option<Frontmatter>) {
        self.write_documents().insert(
            id.into(),
            MemoryDocument {
                frontmatter,
                body: String::new(),
                modified_at: Utc::now(),
                unreadable: false,
            },
        );
    }

    pub fn remove(&self, id: &DocumentId) -> bool {
        let removed = self.write_documents().remove(id).is_some();
        if removed {
            self.emit(StoreEvent::Deleted(id.clone()));
        }
        removed
    }

    pub fn rename(&self, from: &DocumentId, to: impl Into<DocumentId>) -> bool {
        let to = to.into();
        let moved = {
            let mut documents = self.write_documents();
            match documents.remove(from) {
                Some(document) => {
                    documents.insert(to.clone(), document);
                    true
                }
                None => false,
            }
        };
        if moved {
            self.emit(StoreEvent::Renamed {
                from: from.clone(),
                to,
            });
        }
        moved
    }

    /// Make reads of `id` fail until the document is written again.
    pub fn poison(&self, id: &DocumentId) {
        if let Some(document) = self.write_documents().get_mut(id) {
            document.unreadable = true;
        }
    }

    /// Forward an arbitrary event to subscribers without touching contents.
    pub fn emit(&self, event: StoreEvent) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn write_documents(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, BTreeMap<DocumentId, MemoryDocument>> {
        match self.documents.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read_documents(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, BTreeMap<DocumentId, MemoryDocument>> {
        match self.documents.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl DocumentStore for MemoryStore {
    fn list_documents(&self) -> Vec<DocumentId> {
        self.read_documents().keys().cloned().collect()
    }

    fn read_frontmatter(&self, id: &DocumentId) -> Result<Option<Frontmatter>, StoreError> {
        match self.read_documents().get(id) {
            Some(document) if document.unreadable => Err(StoreError::Unavailable(id.clone())),
            Some(document) => Ok(document.frontmatter.clone()),
            None => Ok(None),
        }
    }

    fn read_body(&self, id: &DocumentId) -> Option<String> {
        self.read_documents().get(id).map(|d| d.body.clone())
    }

    fn modified_at(&self, id: &DocumentId) -> Option<DateTime<Utc>> {
        self.read_documents().get(id).map(|d| d.modified_at)
    }

    fn display_name(&self, id: &DocumentId) -> String {
        self.read_documents()
            .get(id)
            .and_then(|d| d.frontmatter.as_ref())
            .and_then(|fm| fm.get("title"))
            .and_then(|title| title.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| id.stem().to_string())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.subscribers.lock() {
            Ok(mut guard) => guard.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fm(value: serde_json::Value) -> Option<Frontmatter> {
        serde_json::from_value(value).ok()
    }

    #[test]
    fn test_put_emits_created_then_modified() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        store.put("a.md", fm(json!({"parent": "[[b]]"})));
        store.put("a.md", fm(json!({"parent": "[[c]]"})));

        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Created("a.md".into()));
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Modified("a.md".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_rename_moves_contents() {
        let store = MemoryStore::new();
        store.seed("a.md", fm(json!({"title": "Alpha"})));
        let mut rx = store.subscribe();

        assert!(store.rename(&"a.md".into(), "dir/b.md"));
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreEvent::Renamed { from: "a.md".into(), to: "dir/b.md".into() }
        );
        assert_eq!(store.read_frontmatter(&"a.md".into()).unwrap(), None);
        assert_eq!(store.display_name(&"dir/b.md".into()), "Alpha");
        assert!(!store.rename(&"missing.md".into(), "x.md"));
    }

    #[test]
    fn test_poisoned_documents_fail_to_read() {
        let store = MemoryStore::new();
        store.seed("a.md", fm(json!({})));
        store.poison(&"a.md".into());
        assert!(store.read_frontmatter(&"a.md".into()).is_err());
        store.put("a.md", fm(json!({})));
        assert!(store.read_frontmatter(&"a.md".into()).is_ok());
    }
}
