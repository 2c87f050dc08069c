//! Full index rebuild with bounded concurrency

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream;
use tracing::{debug, warn};
use trellis_core::{ChangeEvent, DocumentId, RelationshipRecord};

use crate::index::IndexState;

/// Outcome of a full scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanStats {
    /// In-scope documents listed by the store.
    pub listed: usize,
    /// Documents that now have a record.
    pub indexed: usize,
    /// Documents whose read failed; their previous record, if any, is kept.
    pub failed: usize,
    /// Records dropped because their document vanished or lost its frontmatter.
    pub removed: usize,
}

enum Outcome {
    Record(RelationshipRecord),
    NoFrontmatter,
    Failed(String),
}

/// Re-read every in-scope document and reconcile the cache with the result.
///
/// Reads fan out over the blocking pool, at most `scan_concurrency` at a time.
/// Results are applied afterwards in path order, on the caller's task.
pub(crate) async fn rebuild(state: &Arc<IndexState>, announce: bool) -> ScanStats {
    let ids: Vec<DocumentId> = state
        .store
        .list_documents()
        .into_iter()
        .filter(|id| state.scope.qualifies(id))
        .collect();
    let mut stats = ScanStats {
        listed: ids.len(),
        ..ScanStats::default()
    };

    let concurrency = state.settings.scan_concurrency.max(1);
    let mut outcomes: Vec<(DocumentId, Outcome)> = stream::iter(ids)
        .map(|id| {
            let state = Arc::clone(state);
            async move {
                let task_id = id.clone();
                let joined = tokio::task::spawn_blocking(move || state.compute(&task_id)).await;
                let outcome = match joined {
                    Ok(Ok(Some(record))) => Outcome::Record(record),
                    Ok(Ok(None)) => Outcome::NoFrontmatter,
                    Ok(Err(e)) => Outcome::Failed(e.to_string()),
                    Err(e) => Outcome::Failed(e.to_string()),
                };
                (id, outcome)
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;
    outcomes.sort_by(|a, b| a.0.cmp(&b.0));

    let mut keep: HashSet<DocumentId> = HashSet::with_capacity(outcomes.len());
    for (id, outcome) in outcomes {
        match outcome {
            Outcome::Record(record) => {
                stats.indexed += 1;
                keep.insert(id.clone());
                let after = Arc::new(record);
                let before = state.cache.insert(id.clone(), Arc::clone(&after));
                let changed = before
                    .as_ref()
                    .is_none_or(|before| !before.same_relationships(&after));
                if announce && changed {
                    state.emit(ChangeEvent::changed(id, before, after));
                }
            }
            Outcome::NoFrontmatter => {
                debug!("No frontmatter in {}", id);
            }
            Outcome::Failed(reason) => {
                stats.failed += 1;
                keep.insert(id.clone());
                warn!("Skipping {} during scan: {}", id, reason);
            }
        }
    }

    let stale: Vec<DocumentId> = state
        .cache
        .iter()
        .map(|entry| entry.key().clone())
        .filter(|id| !keep.contains(id))
        .collect();
    for id in stale {
        if let Some((_, before)) = state.cache.remove(&id) {
            stats.removed += 1;
            if announce {
                state.emit(ChangeEvent::deleted(id, Some(before)));
            }
        }
    }

    stats
}
