//! AlertPresenter: the UI side that renders AlertState and forwards intents
//!
//! Presenters only read state. Intents go back through the engine.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::types::AlertState;

/// Live updates kept per entry for slow subscribers
const CHANNEL_CAPACITY: usize = 64;

/// Receives every AlertState change
pub trait AlertPresenter: Send + Sync {
    fn on_alert_state_changed(&self, entry_id: &str, state: &AlertState);

    /// Entry archived; no further updates follow
    fn on_entry_closed(&self, _entry_id: &str) {}
}

/// Presenter that ignores everything
#[derive(Debug, Default)]
pub struct NullPresenter;

impl AlertPresenter for NullPresenter {
    fn on_alert_state_changed(&self, _entry_id: &str, _state: &AlertState) {}
}

/// Fans state changes out to per-entry broadcast channels (WebSocket clients)
#[derive(Debug, Default)]
pub struct BroadcastPresenter {
    channels: Mutex<HashMap<String, broadcast::Sender<AlertState>>>,
}

impl BroadcastPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one entry's updates
    pub fn subscribe(&self, entry_id: &str) -> broadcast::Receiver<AlertState> {
        self.lock()
            .entry(entry_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drop the entry's channel; subscribers see the stream end
    pub fn close(&self, entry_id: &str) {
        self.lock().remove(entry_id);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<AlertState>>> {
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AlertPresenter for BroadcastPresenter {
    fn on_alert_state_changed(&self, entry_id: &str, state: &AlertState) {
        if let Some(tx) = self.lock().get(entry_id) {
            // No subscribers is fine
            let _ = tx.send(state.clone());
        }
    }

    fn on_entry_closed(&self, entry_id: &str) {
        self.close(entry_id);
    }
}
