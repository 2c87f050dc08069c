//! The relationship index: a debounced, incrementally maintained cache of
//! every in-scope document's declared relationships.

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trellis_core::{
    ChangeEvent, DocumentId, DocumentStore, Frontmatter, RelationshipLookup, RelationshipRecord,
    Settings, StoreError,
};

use crate::extractor::{DocumentMeta, RelationshipExtractor};
use crate::pipeline::Pipeline;
use crate::scan::{self, ScanStats};
use crate::scope::ScanScope;

/// Capacity of the change-event broadcast channel.
const EVENT_CAPACITY: usize = 1024;

/// State shared between the index handle, the pipeline task and scans.
pub(crate) struct IndexState {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) settings: Settings,
    pub(crate) extractor: RelationshipExtractor,
    pub(crate) scope: ScanScope,
    pub(crate) cache: DashMap<DocumentId, Arc<RelationshipRecord>>,
    events: broadcast::Sender<ChangeEvent>,
}

impl IndexState {
    /// Recompute a record from current ground truth.
    ///
    /// `Ok(None)` means the document should not be in the cache: out of scope,
    /// gone, or without frontmatter.
    pub(crate) fn compute(
        &self,
        id: &DocumentId,
    ) -> Result<Option<RelationshipRecord>, StoreError> {
        if !self.scope.qualifies(id) {
            return Ok(None);
        }
        let Some(frontmatter) = self.store.read_frontmatter(id)? else {
            return Ok(None);
        };
        let modified_at = self.store.modified_at(id).unwrap_or_else(Utc::now);
        let meta = DocumentMeta::new(id.clone(), modified_at);
        Ok(Some(self.extractor.extract(&meta, &frontmatter)))
    }

    pub(crate) fn emit(&self, event: ChangeEvent) {
        debug!("Change event {:?} for {}", event.kind, event.id);
        // No receivers just means nobody is listening yet.
        let _ = self.events.send(event);
    }
}

impl RelationshipLookup for IndexState {
    fn record(&self, id: &DocumentId) -> Option<Arc<RelationshipRecord>> {
        self.cache.get(id).map(|entry| entry.value().clone())
    }

    fn snapshot(&self) -> Vec<Arc<RelationshipRecord>> {
        self.cache.iter().map(|entry| entry.value().clone()).collect()
    }
}

pub(crate) enum Command {
    Rescan(oneshot::Sender<ScanStats>),
}

struct Running {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// Cache of relationship records kept in sync with a [`DocumentStore`].
pub struct RelationshipIndex {
    state: Arc<IndexState>,
    running: Mutex<Option<Running>>,
}

impl RelationshipIndex {
    pub fn new(store: Arc<dyn DocumentStore>, settings: Settings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = IndexState {
            store,
            extractor: RelationshipExtractor::new(settings.properties.clone()),
            scope: ScanScope::new(&settings.scan_directories),
            settings,
            cache: DashMap::new(),
            events,
        };
        RelationshipIndex {
            state: Arc::new(state),
            running: Mutex::new(None),
        }
    }

    /// Backfill the cache, then start consuming the store's mutation stream.
    ///
    /// The subscription is taken before the scan so nothing is lost, but its
    /// events are only processed once the backfill has completed.
    pub async fn start(&self) -> Result<ScanStats> {
        if self.is_running() {
            bail!("relationship index already started");
        }

        let store_rx = self.state.store.subscribe();
        let stats = scan::rebuild(&self.state, false).await;
        info!(
            "Indexed {} of {} documents ({} failed)",
            stats.indexed, stats.listed, stats.failed
        );

        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = Pipeline::spawn(Arc::clone(&self.state), store_rx, command_rx);

        let mut running = self.lock_running();
        if running.is_some() {
            task.abort();
            bail!("relationship index already started");
        }
        *running = Some(Running { commands, task });
        Ok(stats)
    }

    /// Forced full rebuild. Emits events for every record that changed.
    pub async fn scan_all(&self) -> Result<ScanStats> {
        let commands = self.lock_running().as_ref().map(|r| r.commands.clone());
        let Some(commands) = commands else {
            return Ok(scan::rebuild(&self.state, true).await);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(Command::Rescan(reply_tx))
            .map_err(|_| anyhow!("relationship index pipeline has stopped"))?;
        let stats = reply_rx
            .await
            .map_err(|_| anyhow!("relationship index pipeline dropped the rescan"))?;
        Ok(stats)
    }

    /// Stop consuming store events. The cache keeps its last contents.
    pub fn stop(&self) {
        if let Some(running) = self.lock_running().take() {
            running.task.abort();
            info!("Relationship index stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_running()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Receive a [`ChangeEvent`] for every settled mutation from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.state.events.subscribe()
    }

    pub fn is_in_scope(&self, path: &DocumentId) -> bool {
        self.state.scope.is_in_scope(path)
    }

    pub fn extract_relationships(
        &self,
        doc: &DocumentMeta,
        frontmatter: &Frontmatter,
    ) -> RelationshipRecord {
        self.state.extractor.extract(doc, frontmatter)
    }

    pub fn record(&self, id: &DocumentId) -> Option<Arc<RelationshipRecord>> {
        self.state.record(id)
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.state.cache.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.cache.is_empty()
    }

    /// Indexed document ids in path order.
    pub fn ids(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = self.state.cache.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.state.store)
    }

    /// Shared read-only view for the graph builder.
    pub fn lookup(&self) -> Arc<dyn RelationshipLookup> {
        self.state.clone()
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Relationship index control lock was poisoned");
                poisoned.into_inner()
            }
        }
    }
}

impl RelationshipLookup for RelationshipIndex {
    fn record(&self, id: &DocumentId) -> Option<Arc<RelationshipRecord>> {
        self.state.record(id)
    }

    fn snapshot(&self) -> Vec<Arc<RelationshipRecord>> {
        self.state.snapshot()
    }
}

impl Drop for RelationshipIndex {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            if let Some(running) = running.take() {
                running.task.abort();
            }
        }
    }
}
