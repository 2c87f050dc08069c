//! Per-key debouncing for the event pipeline
//!
//! Each key owns at most one pending timer. Scheduling a key again aborts its
//! timer and starts a fresh one, so a burst of events collapses into a single
//! firing `delay` after the last event. Keys are independent: a busy key never
//! delays another.
//!
//! Timers report back over an mpsc channel rather than running work
//! themselves, so the consumer stays the only place where state changes. A
//! generation number guards against a timer that fired just before it was
//! cancelled.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A timer that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<K> {
    pub key: K,
    generation: u64,
}

struct Pending {
    generation: u64,
    timer: JoinHandle<()>,
}

pub struct KeyedDebouncer<K> {
    delay: Duration,
    pending: HashMap<K, Pending>,
    next_generation: u64,
    fired_tx: mpsc::UnboundedSender<Fired<K>>,
}

impl<K> KeyedDebouncer<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    /// Create a debouncer and the receiver its timers fire into.
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<Fired<K>>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let debouncer = KeyedDebouncer {
            delay,
            pending: HashMap::new(),
            next_generation: 0,
            fired_tx,
        };
        (debouncer, fired_rx)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Start or restart the timer for `key`.
    pub fn schedule(&mut self, key: K) {
        self.cancel(&key);

        self.next_generation += 1;
        let generation = self.next_generation;
        let tx = self.fired_tx.clone();
        let delay = self.delay;
        let fired_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Fired {
                key: fired_key,
                generation,
            });
        });

        self.pending.insert(key, Pending { generation, timer });
    }

    /// Drop the pending timer for `key`. Returns whether one existed.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.pending.remove(key) {
            Some(pending) => {
                pending.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Accept a firing if it is still the latest timer for its key.
    ///
    /// Stale firings (rescheduled or cancelled after the timer woke) return false.
    pub fn settle(&mut self, fired: &Fired<K>) -> bool {
        match self.pending.get(&fired.key) {
            Some(pending) if pending.generation == fired.generation => {
                self.pending.remove(&fired.key);
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Abort every pending timer.
    pub fn clear(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.timer.abort();
        }
    }
}

impl<K> Drop for KeyedDebouncer<K> {
    fn drop(&mut self) {
        for pending in self.pending.values() {
            pending.timer.abort();
        }
    }
}
