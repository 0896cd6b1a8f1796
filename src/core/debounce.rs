//! DebounceGate: collapses bursts of text revisions into one scan
//!
//! One pending slot per entry. Every submit replaces the pending revision and
//! restarts the window; only the timer for the latest submit fires. Fired
//! revisions come out of the channel returned by `DebounceGate::new`.
//!
//! A fired revision stays in its slot, marked fired, until the consumer
//! `settle`s it. Until then `take` can still hand it out, so closing an entry
//! never loses a revision that is between the timer and the scan.
//!
//! Scans already handed off are never cancelled. If a newer revision arrives
//! meanwhile, the older result is dropped by the state machine's revision
//! ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::types::JournalRevision;

#[derive(Debug)]
struct PendingRevision {
    generation: u64,
    fired: bool,
    revision: JournalRevision,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingRevision>>>;

/// Per-entry trailing debounce
#[derive(Debug)]
pub struct DebounceGate {
    window: Duration,
    pending: PendingMap,
    generation: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<JournalRevision>,
}

impl DebounceGate {
    /// Create gate and the receiver that yields revisions ready to scan
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<JournalRevision>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Self {
            window,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            tx,
        };
        (gate, rx)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Submit a revision; restarts the entry's window.
    ///
    /// Must be called inside a tokio runtime.
    pub fn submit(&self, revision: JournalRevision) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let entry_id = revision.entry_id.clone();

        {
            let mut pending = lock(&self.pending);
            match pending.get_mut(&entry_id) {
                Some(slot) => {
                    slot.generation = generation;
                    slot.fired = false;
                    // Out-of-order submits keep the newest text
                    if revision.revision_seq >= slot.revision.revision_seq {
                        slot.revision = revision;
                    }
                }
                None => {
                    pending.insert(
                        entry_id.clone(),
                        PendingRevision {
                            generation,
                            fired: false,
                            revision,
                        },
                    );
                }
            }
        }
        trace!(entry_id = %entry_id, generation, "debounce window restarted");

        let pending = Arc::clone(&self.pending);
        let tx = self.tx.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let ready = {
                let mut map = lock(&pending);
                match map.get_mut(&entry_id) {
                    Some(slot) if slot.generation == generation && !slot.fired => {
                        slot.fired = true;
                        Some(slot.revision.clone())
                    }
                    _ => None,
                }
            };
            if let Some(revision) = ready {
                debug!(entry_id = %entry_id, revision_seq = revision.revision_seq, "debounce fired");
                let _ = tx.send(revision);
            }
        });
    }

    /// Fire the entry's pending revision now, if it has not fired yet
    pub fn flush(&self, entry_id: &str) -> bool {
        let revision = {
            let mut map = lock(&self.pending);
            match map.get_mut(entry_id) {
                Some(slot) if !slot.fired => {
                    slot.fired = true;
                    Some(slot.revision.clone())
                }
                _ => None,
            }
        };
        match revision {
            Some(revision) => {
                debug!(entry_id = %entry_id, revision_seq = revision.revision_seq, "debounce flushed");
                self.tx.send(revision).is_ok()
            }
            None => false,
        }
    }

    /// Remove the entry's latest revision, fired or not, and hand it to the
    /// caller. The running timer finds nothing when it wakes.
    pub fn take(&self, entry_id: &str) -> Option<JournalRevision> {
        lock(&self.pending).remove(entry_id).map(|slot| slot.revision)
    }

    /// The consumer has applied a fired revision. A newer submit since the
    /// fire keeps its slot.
    pub fn settle(&self, entry_id: &str, revision_seq: u64) -> bool {
        let mut map = lock(&self.pending);
        match map.get(entry_id) {
            Some(slot) if slot.fired && slot.revision.revision_seq == revision_seq => {
                map.remove(entry_id);
                true
            }
            _ => false,
        }
    }

    /// Entries with a timer running
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).values().filter(|slot| !slot.fired).count()
    }

    pub fn is_pending(&self, entry_id: &str) -> bool {
        lock(&self.pending).get(entry_id).is_some_and(|slot| !slot.fired)
    }
}

/// A poisoned lock only means a timer task panicked mid-update; the map is
/// still usable.
fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<String, PendingRevision>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_single_submit_fires_after_window() {
        let (gate, mut rx) = DebounceGate::new(Duration::from_millis(300));
        gate.submit(JournalRevision::new("e1", "hello", 1));
        assert!(gate.is_pending("e1"));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.revision_seq, 1);
        assert_eq!(gate.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_fires_immediately() {
        let (gate, mut rx) = DebounceGate::new(Duration::from_secs(60));
        gate.submit(JournalRevision::new("e1", "hello", 1));
        assert!(gate.flush("e1"));
        assert_eq!(rx.recv().await.unwrap().text, "hello");
        assert!(!gate.flush("e1"));

        // The original timer wakes later and finds nothing to send
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_hands_back_pending_without_firing() {
        let (gate, mut rx) = DebounceGate::new(Duration::from_millis(300));
        gate.submit(JournalRevision::new("e1", "hello", 1));
        gate.submit(JournalRevision::new("e1", "hello there", 2));

        let taken = gate.take("e1").unwrap();
        assert_eq!(taken.revision_seq, 2);
        assert_eq!(taken.text, "hello there");
        assert!(gate.take("e1").is_none());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fired_revision_can_be_taken_until_settled() {
        let (gate, mut rx) = DebounceGate::new(Duration::from_millis(300));
        gate.submit(JournalRevision::new("e1", "hello", 1));
        assert_eq!(rx.recv().await.unwrap().revision_seq, 1);
        assert!(!gate.is_pending("e1"));

        // Not yet settled: still recoverable
        assert_eq!(gate.take("e1").unwrap().text, "hello");

        gate.submit(JournalRevision::new("e1", "again", 2));
        assert_eq!(rx.recv().await.unwrap().revision_seq, 2);
        assert!(gate.settle("e1", 2));
        assert!(gate.take("e1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_keeps_newer_submit() {
        let (gate, mut rx) = DebounceGate::new(Duration::from_millis(300));
        gate.submit(JournalRevision::new("e1", "first", 1));
        assert_eq!(rx.recv().await.unwrap().revision_seq, 1);

        gate.submit(JournalRevision::new("e1", "second", 2));
        assert!(!gate.settle("e1", 1));
        assert!(gate.is_pending("e1"));
        assert_eq!(rx.recv().await.unwrap().text, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_submit_keeps_newest_text() {
        let (gate, mut rx) = DebounceGate::new(Duration::from_millis(300));
        gate.submit(JournalRevision::new("e1", "newer", 5));
        gate.submit(JournalRevision::new("e1", "older", 3));
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.revision_seq, 5);
        assert_eq!(fired.text, "newer");
    }
}
