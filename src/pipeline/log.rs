//! Append-only alert log owned by the orchestrator.
//!
//! Writers append, readers get cloned snapshots; nobody can mutate or
//! reorder existing entries.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error};

use crate::types::{LogEntry, LogKind};

#[derive(Debug, Default)]
pub struct AlertLog {
    entries: RwLock<Vec<LogEntry>>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<LogEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<LogEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an entry and mirror it to tracing.
    pub fn append(&self, entry: LogEntry) {
        match entry.kind {
            LogKind::Alert => debug!("[ALERT] {}", entry.message),
            LogKind::Error => error!("[ERROR] {}", entry.message),
        }
        self.write().push(entry);
    }

    pub fn record_alert(&self, message: impl Into<String>) {
        self.append(LogEntry::alert(message));
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.append(LogEntry::error(message));
    }

    /// Copy of every entry, in insertion order.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.read().clone()
    }

    /// Entries appended at or after `cursor`, plus the cursor for the next
    /// call. Lets a poller render incrementally without re-reading history.
    pub fn since(&self, cursor: usize) -> (Vec<LogEntry>, usize) {
        let entries = self.read();
        let start = cursor.min(entries.len());
        (entries[start..].to_vec(), entries.len())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn count(&self, kind: LogKind) -> usize {
        self.read().iter().filter(|e| e.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let log = AlertLog::new();
        log.record_alert("first");
        log.record_error("second");
        log.record_alert("third");

        let messages: Vec<String> = log.snapshot().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(log.count(LogKind::Alert), 2);
        assert_eq!(log.count(LogKind::Error), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let log = AlertLog::new();
        log.record_alert("a");
        let snap = log.snapshot();
        log.record_alert("b");
        assert_eq!(snap.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_since_cursor() {
        let log = AlertLog::new();
        log.record_alert("a");
        log.record_alert("b");

        let (first, cursor) = log.since(0);
        assert_eq!(first.len(), 2);
        assert_eq!(cursor, 2);

        let (none, cursor) = log.since(cursor);
        assert!(none.is_empty());

        log.record_error("c");
        let (next, cursor) = log.since(cursor);
        assert_eq!(next.len(), 1);
        assert!(next[0].is_error());
        assert_eq!(cursor, 3);

        // Stale cursor past the end is clamped.
        let (clamped, _) = log.since(99);
        assert!(clamped.is_empty());
    }
}
