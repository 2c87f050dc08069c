//! Sequential event-processing loop of the relationship index
//!
//! Every cache mutation after startup happens here, on one task. Raw store
//! events are filtered, then routed:
//!
//! - create/modify: debounced per path, then recomputed and announced;
//! - delete: applied immediately, cancelling any pending modify;
//! - rename: debounced per destination with a longer window, then the cache
//!   entry is moved and every referrer recomputed, without announcements.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trellis_core::{ChangeEvent, DocumentId, StoreEvent};

use crate::debounce::{Fired, KeyedDebouncer};
use crate::index::{Command, IndexState};
use crate::scan;

pub(crate) struct Pipeline {
    state: Arc<IndexState>,
    modifies: KeyedDebouncer<DocumentId>,
    renames: KeyedDebouncer<DocumentId>,
    /// Pending renames: destination path -> original path.
    rename_origins: HashMap<DocumentId, DocumentId>,
}

impl Pipeline {
    pub(crate) fn spawn(
        state: Arc<IndexState>,
        store_rx: mpsc::UnboundedReceiver<StoreEvent>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> JoinHandle<()> {
        let (modifies, modify_rx) = KeyedDebouncer::new(state.settings.modify_debounce());
        let (renames, rename_rx) = KeyedDebouncer::new(state.settings.rename_debounce());
        let pipeline = Pipeline {
            state,
            modifies,
            renames,
            rename_origins: HashMap::new(),
        };
        tokio::spawn(pipeline.run(store_rx, commands, modify_rx, rename_rx))
    }

    async fn run(
        mut self,
        mut store_rx: mpsc::UnboundedReceiver<StoreEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut modify_rx: mpsc::UnboundedReceiver<Fired<DocumentId>>,
        mut rename_rx: mpsc::UnboundedReceiver<Fired<DocumentId>>,
    ) {
        info!("Relationship index pipeline started");
        loop {
            tokio::select! {
                event = store_rx.recv() => match event {
                    Some(event) => self.on_store_event(event),
                    None => {
                        info!("Document store closed its event stream");
                        break;
                    }
                },
                Some(fired) = modify_rx.recv() => self.on_modify_settled(fired),
                Some(fired) = rename_rx.recv() => self.on_rename_settled(fired),
                Some(command) = commands.recv() => match command {
                    Command::Rescan(reply) => {
                        self.flush_renames();
                        let stats = scan::rebuild(&self.state, true).await;
                        info!(
                            "Rescan indexed {} of {} documents ({} failed, {} removed)",
                            stats.indexed, stats.listed, stats.failed, stats.removed
                        );
                        let _ = reply.send(stats);
                    }
                },
            }
        }
        self.modifies.clear();
        self.renames.clear();
    }

    fn on_store_event(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Created(id) | StoreEvent::Modified(id) => {
                if !self.state.scope.qualifies(&id) {
                    debug!("Ignoring change outside scan scope: {}", id);
                    return;
                }
                debug!("Scheduling recompute of {}", id);
                self.modifies.schedule(id);
            }
            StoreEvent::Deleted(id) => {
                if !id.is_document() {
                    return;
                }
                self.on_deleted(id);
            }
            StoreEvent::Renamed { from, to } => {
                let scope = &self.state.scope;
                if !scope.qualifies(&from) && !scope.qualifies(&to) {
                    debug!("Ignoring rename outside scan scope: {} -> {}", from, to);
                    return;
                }
                self.on_renamed(from, to);
            }
        }
    }

    fn on_deleted(&mut self, id: DocumentId) {
        // A stale modify must never resurrect the record.
        self.modifies.cancel(&id);

        // Renamed and then deleted before the rename settled: the original goes too.
        if let Some(origin) = self.rename_origins.remove(&id) {
            self.renames.cancel(&id);
            if let Some((_, before)) = self.state.cache.remove(&origin) {
                self.state.emit(ChangeEvent::deleted(origin, Some(before)));
            }
        }

        match self.state.cache.remove(&id) {
            Some((_, before)) => self.state.emit(ChangeEvent::deleted(id, Some(before))),
            None => debug!("Deleted document {} was not indexed", id),
        }
    }

    fn on_renamed(&mut self, from: DocumentId, to: DocumentId) {
        self.modifies.cancel(&from);

        // Chained renames inside one window collapse onto the first origin.
        let origin = match self.rename_origins.remove(&from) {
            Some(origin) => {
                self.renames.cancel(&from);
                origin
            }
            None => from,
        };
        debug!("Scheduling rename reconciliation {} -> {}", origin, to);
        self.rename_origins.insert(to.clone(), origin);
        self.renames.schedule(to);
    }

    fn on_modify_settled(&mut self, fired: Fired<DocumentId>) {
        if !self.modifies.settle(&fired) {
            return;
        }
        let id = fired.key;
        if self.renames.is_pending(&id) {
            // The rename reconciliation recomputes this path anyway.
            debug!("Deferring {} to its pending rename", id);
            return;
        }

        let before = self.state.cache.get(&id).map(|entry| entry.value().clone());
        match self.state.compute(&id) {
            Ok(Some(record)) => {
                let after = Arc::new(record);
                self.state.cache.insert(id.clone(), Arc::clone(&after));
                self.state.emit(ChangeEvent::changed(id, before, after));
            }
            Ok(None) => {
                if let Some((_, before)) = self.state.cache.remove(&id) {
                    self.state.emit(ChangeEvent::deleted(id, Some(before)));
                }
            }
            Err(e) => warn!("Keeping last known relationships for {}: {}", id, e),
        }
    }

    fn on_rename_settled(&mut self, fired: Fired<DocumentId>) {
        if !self.renames.settle(&fired) {
            return;
        }
        let to = fired.key;
        if let Some(from) = self.rename_origins.remove(&to) {
            self.reconcile_rename(from, to);
        }
    }

    /// Settle every pending rename now, so a rescan sees them as already applied.
    fn flush_renames(&mut self) {
        let pending: Vec<(DocumentId, DocumentId)> = self.rename_origins.drain().collect();
        for (to, from) in pending {
            self.renames.cancel(&to);
            self.reconcile_rename(from, to);
        }
    }

    fn reconcile_rename(&mut self, from: DocumentId, to: DocumentId) {
        let previous = self.state.cache.remove(&from).map(|(_, record)| record);
        match self.state.compute(&to) {
            Ok(Some(record)) => {
                self.state.cache.insert(to.clone(), Arc::new(record));
            }
            Ok(None) => {
                self.state.cache.remove(&to);
            }
            Err(e) => {
                warn!("Failed to re-read renamed document {}: {}", to, e);
                if let Some(previous) = previous {
                    let mut moved = (*previous).clone();
                    moved.id = to.clone();
                    self.state.cache.insert(to.clone(), Arc::new(moved));
                }
            }
        }

        let referrers: Vec<DocumentId> = self
            .state
            .cache
            .iter()
            .filter(|entry| entry.key() != &to && entry.value().references(&from))
            .map(|entry| entry.key().clone())
            .collect();
        for id in &referrers {
            self.recompute_silently(id);
        }

        info!(
            "Reconciled rename {} -> {} ({} referrers recomputed)",
            from,
            to,
            referrers.len()
        );
    }

    fn recompute_silently(&self, id: &DocumentId) {
        match self.state.compute(id) {
            Ok(Some(record)) => {
                self.state.cache.insert(id.clone(), Arc::new(record));
            }
            Ok(None) => {
                self.state.cache.remove(id);
            }
            Err(e) => warn!("Keeping last known relationships for {}: {}", id, e),
        }
    }
}
