use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::models::history::HistoryEntry;

const STREAM_CAPACITY: usize = 256;

/// Append-only status stream shared by the organizer, the janitor and any
/// presentation layer. Consecutive duplicate messages collapse into one entry.
pub struct AuditLog {
    entries: Mutex<VecDeque<HistoryEntry>>,
    capacity: usize,
    sender: broadcast::Sender<HistoryEntry>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            sender,
        }
    }

    /// Returns `false` when the message repeated the previous entry and was collapsed.
    pub fn append(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if entries.back().is_some_and(|last| last.message == message) {
            return false;
        }

        tracing::info!(target: "tidyfold::audit", "{message}");
        let entry = HistoryEntry::new(message);
        entries.push_back(entry.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        drop(entries);

        // No receivers is fine; the snapshot still has the entry.
        let _ = self.sender.send(entry);
        true
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|entry| entry.message).collect()
    }

    pub fn last_message(&self) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .back()
            .map(|entry| entry.message.clone())
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEntry> {
        self.sender.subscribe()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_AUDIT_LOG_CAPACITY)
    }
}
