//! Filesystem watcher turning notify events into store events

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use trellis_core::{DocumentId, StoreEvent};

/// How long the first half of a split rename waits for its partner.
const RENAME_PAIRING_WINDOW: Duration = Duration::from_millis(100);

/// Fan-out of store events to every subscriber.
#[derive(Default)]
pub struct Subscribers {
    senders: Mutex<Vec<mpsc::UnboundedSender<StoreEvent>>>,
}

impl Subscribers {
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    /// Deliver an event, forgetting subscribers that went away.
    pub fn send(&self, event: StoreEvent) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<StoreEvent>>> {
        match self.senders.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Watches a vault directory and forwards its changes as [`StoreEvent`]s.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    watched_paths: HashSet<PathBuf>,
    root_path: PathBuf,
}

impl FileWatcher {
    /// Create a watcher whose events are relative to `root_path`.
    ///
    /// Raw events are handed to a forwarding thread that pairs up split
    /// renames before anything reaches the subscribers.
    pub fn new(root_path: impl AsRef<Path>, subscribers: Arc<Subscribers>) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();

        let (tx, rx) = std::sync::mpsc::channel();
        let watcher = notify::recommended_watcher(tx)?;

        let root = root_path.clone();
        thread::Builder::new()
            .name("trellis-watcher".to_string())
            .spawn(move || forward_events(rx, &root, &subscribers))?;

        Ok(Self {
            watcher,
            watched_paths: HashSet::new(),
            root_path,
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Watch a directory recursively
    pub fn watch_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Watching directory: {:?}", path);

        self.watcher.watch(path, RecursiveMode::Recursive)?;
        self.watched_paths.insert(path.to_path_buf());
        Ok(())
    }

    /// Stop watching a path
    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("Stopping watch for: {:?}", path);

        self.watcher.unwatch(path)?;
        self.watched_paths.remove(path);
        Ok(())
    }

    /// Check if a path is being watched
    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched_paths.contains(path)
    }

    /// Get all watched paths
    pub fn watched_paths(&self) -> &HashSet<PathBuf> {
        &self.watched_paths
    }
}

/// Runs until the watcher is dropped and its event sender goes away.
fn forward_events(
    rx: Receiver<notify::Result<notify::Event>>,
    root: &Path,
    subscribers: &Subscribers,
) {
    let mut pairing = RenamePairing::default();
    loop {
        let received = if pairing.is_idle() {
            rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            rx.recv_timeout(RENAME_PAIRING_WINDOW)
        };

        let mut events = match received {
            Ok(Ok(event)) => {
                debug!("File system event: {:?}", event);
                pairing.accept(&event, root, Instant::now())
            }
            Ok(Err(e)) => {
                error!("File system watch error: {}", e);
                Vec::new()
            }
            Err(RecvTimeoutError::Timeout) => Vec::new(),
            Err(RecvTimeoutError::Disconnected) => break,
        };
        events.extend(pairing.expire(root, Instant::now()));
        for event in events {
            subscribers.send(event);
        }
    }

    for event in pairing.drain(root) {
        subscribers.send(event);
    }
    debug!("Watcher event forwarding stopped for {}", root.display());
}

/// Joins rename halves that a backend reports as separate events.
///
/// inotify reports one rename as a `From` half, a `To` half and a combined
/// `Both` event, all sharing a tracker id. The `From` half is held back until
/// its partner arrives, so the rename surfaces as a single `Renamed`. A `From`
/// still unpaired after [`RENAME_PAIRING_WINDOW`] was a move out of the vault
/// and becomes a deletion. Events without a tracker go through [`translate`].
#[derive(Debug, Default)]
pub struct RenamePairing {
    /// `From` halves waiting for a partner, by tracker.
    pending: HashMap<usize, (PathBuf, Instant)>,
    /// Trackers already reported as a rename; their trailing `Both` is dropped.
    reported: HashMap<usize, Instant>,
}

impl RenamePairing {
    pub fn accept(&mut self, event: &notify::Event, root: &Path, now: Instant) -> Vec<StoreEvent> {
        let Some(tracker) = event.attrs.tracker() else {
            return translate(event, root);
        };

        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => match event.paths.first() {
                Some(from) => {
                    self.pending.insert(tracker, (from.clone(), now));
                    Vec::new()
                }
                None => Vec::new(),
            },
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                match (self.pending.remove(&tracker), event.paths.first()) {
                    (Some((from, _)), Some(to)) => {
                        self.reported.insert(tracker, now);
                        rename_events(&from, to, root)
                    }
                    _ => translate(event, root),
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                self.pending.remove(&tracker);
                if self.reported.remove(&tracker).is_some() {
                    Vec::new()
                } else {
                    translate(event, root)
                }
            }
            _ => translate(event, root),
        }
    }

    /// Turn `From` halves whose partner never came into deletions.
    pub fn expire(&mut self, root: &Path, now: Instant) -> Vec<StoreEvent> {
        let is_stale = |since: &Instant| now.duration_since(*since) >= RENAME_PAIRING_WINDOW;
        self.reported.retain(|_, since| !is_stale(since));

        let stale: Vec<usize> = self
            .pending
            .iter()
            .filter(|(_, (_, since))| is_stale(since))
            .map(|(tracker, _)| *tracker)
            .collect();
        stale
            .into_iter()
            .filter_map(|tracker| self.pending.remove(&tracker))
            .filter_map(|(path, _)| document_id(&path, root))
            .map(StoreEvent::Deleted)
            .collect()
    }

    /// Report every held `From` half as a deletion.
    pub fn drain(&mut self, root: &Path) -> Vec<StoreEvent> {
        self.reported.clear();
        self.pending
            .drain()
            .filter_map(|(_, (path, _))| document_id(&path, root))
            .map(StoreEvent::Deleted)
            .collect()
    }

    /// True when no half is waiting for its partner.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Translate one notify event into store events for documents under `root`.
///
/// A rename reported with both paths becomes `Renamed`; halves of a rename
/// reported separately become a delete and a create.
pub fn translate(event: &notify::Event, root: &Path) -> Vec<StoreEvent> {
    let ids = move || document_ids(event, root);

    match event.kind {
        EventKind::Create(_) => ids().map(StoreEvent::Created).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let [from, to] = event.paths.as_slice() else {
                return Vec::new();
            };
            rename_events(from, to, root)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            ids().map(StoreEvent::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            ids().map(StoreEvent::Created).collect()
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => ids().map(StoreEvent::Modified).collect(),
        EventKind::Remove(_) => ids().map(StoreEvent::Deleted).collect(),
        _ => Vec::new(),
    }
}

/// A rename whose other side lies outside the vault is a create or a delete.
fn rename_events(from: &Path, to: &Path, root: &Path) -> Vec<StoreEvent> {
    match (document_id(from, root), document_id(to, root)) {
        (Some(from), Some(to)) => vec![StoreEvent::Renamed { from, to }],
        (Some(from), None) => vec![StoreEvent::Deleted(from)],
        (None, Some(to)) => vec![StoreEvent::Created(to)],
        (None, None) => Vec::new(),
    }
}

fn document_ids<'a>(
    event: &'a notify::Event,
    root: &'a Path,
) -> impl Iterator<Item = DocumentId> + 'a {
    event
        .paths
        .iter()
        .filter_map(move |path| document_id(path, root))
}

/// Vault-relative id of a path, unless it lies outside the vault or in an ignored folder.
pub fn document_id(path: &Path, root: &Path) -> Option<DocumentId> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.as_os_str().is_empty() || should_ignore_path(relative) {
        return None;
    }
    Some(DocumentId::new(relative.to_string_lossy().into_owned()))
}

/// Check if a path should be ignored (e.g., .git/, .obsidian/, etc.)
pub fn should_ignore_path(path: &Path) -> bool {
    path.components().any(|component| {
        component.as_os_str().to_str().is_some_and(|name| {
            matches!(name, ".git" | ".obsidian" | ".trash" | "node_modules")
        })
    })
}
