//! Watch Manager (C5, spec §4.5): pattern-indexed registry of bounded
//! per-watcher channels, fed by stores via `WatchSink::publish`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use konsul_core::model::{WatchEvent, WatchEventType};
use konsul_core::pattern::Pattern;
use konsul_core::sink::WatchSink;
use konsul_protocol::WatchStreamEvent;
use parking_lot::RwLock;
use tokio::sync::mpsc;

const DEFAULT_CHANNEL_CAPACITY: usize = 128;

struct WatcherEntry {
    id: u64,
    pattern: Pattern,
    tx: mpsc::Sender<WatchStreamEvent>,
    dropped: AtomicU64,
    pending_resync: AtomicU64,
}

/// Handle returned to a subscriber; dropping it does not remove the
/// registry entry — callers must call `remove_watcher` explicitly so the
/// manager can report the closing reason.
pub struct Watcher {
    pub id: u64,
    pub pattern: String,
    pub receiver: mpsc::Receiver<WatchStreamEvent>,
}

pub struct WatchManager {
    watchers: RwLock<HashMap<u64, Arc<WatcherEntry>>>,
    by_prefix: RwLock<HashMap<String, HashSet<u64>>>,
    next_id: AtomicU64,
    channel_capacity: usize,
    missed_events: AtomicU64,
}

impl WatchManager {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            watchers: RwLock::new(HashMap::new()),
            by_prefix: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            channel_capacity: if channel_capacity == 0 { DEFAULT_CHANNEL_CAPACITY } else { channel_capacity },
            missed_events: AtomicU64::new(0),
        }
    }

    /// `add_watcher(pattern, principal, transport, user) -> Watcher`.
    /// `initial_value` is supplied by the caller (who already holds or has
    /// just released the owning store's read lock); when the pattern is an
    /// exact key and a value is present, a synthetic `set` is delivered
    /// first (spec §4.5 "Initial value policy").
    pub fn add_watcher(&self, pattern: &str, initial_value: Option<Vec<u8>>) -> Watcher {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let compiled = Pattern::compile(pattern);
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let entry = Arc::new(WatcherEntry {
            id,
            pattern: compiled.clone(),
            tx,
            dropped: AtomicU64::new(0),
            pending_resync: AtomicU64::new(0),
        });
        self.watchers.write().insert(id, entry.clone());
        self.by_prefix.write().entry(compiled.literal_prefix()).or_default().insert(id);

        if compiled.is_exact() {
            if let Some(value) = initial_value {
                let _ = entry.tx.try_send(WatchStreamEvent {
                    event_type: "set".to_string(),
                    key: pattern.to_string(),
                    value: Some(String::from_utf8_lossy(&value).to_string()),
                    timestamp: Utc::now().timestamp(),
                    resync_required: false,
                });
            }
        }

        Watcher { id, pattern: pattern.to_string(), receiver: rx }
    }

    pub fn remove_watcher(&self, id: u64) {
        if let Some(entry) = self.watchers.write().remove(&id) {
            if let Some(set) = self.by_prefix.write().get_mut(&entry.pattern.literal_prefix()) {
                set.remove(&id);
            }
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    pub fn dropped_count(&self, id: u64) -> Option<u64> {
        self.watchers.read().get(&id).map(|e| e.dropped.load(Ordering::Relaxed))
    }

    pub fn missed_events_total(&self) -> u64 {
        self.missed_events.load(Ordering::Relaxed)
    }

    fn candidate_ids(&self, key: &str) -> HashSet<u64> {
        let by_prefix = self.by_prefix.read();
        let mut out = HashSet::new();
        if let Some(ids) = by_prefix.get("") {
            out.extend(ids);
        }
        let segments: Vec<&str> = key.split('/').collect();
        let mut prefix = String::new();
        for (i, seg) in segments.iter().enumerate() {
            if i > 0 {
                prefix.push('/');
            }
            prefix.push_str(seg);
            if let Some(ids) = by_prefix.get(&prefix) {
                out.extend(ids);
            }
        }
        out
    }
}

impl WatchSink for WatchManager {
    fn publish(&self, event: WatchEvent) {
        let candidates = self.candidate_ids(&event.key);
        if candidates.is_empty() {
            return;
        }
        let watchers = self.watchers.read();
        let wire_type = match event.event_type {
            WatchEventType::Set => "set",
            WatchEventType::Delete => "delete",
        };
        for id in candidates {
            let Some(entry) = watchers.get(&id) else { continue };
            if !entry.pattern.matches(&event.key) {
                continue;
            }
            let resync_required = entry.pending_resync.swap(0, Ordering::AcqRel) > 0;
            let wire = WatchStreamEvent {
                event_type: wire_type.to_string(),
                key: event.key.clone(),
                value: event.value.as_ref().map(|v| String::from_utf8_lossy(v).to_string()),
                timestamp: event.timestamp,
                resync_required,
            };
            if entry.tx.try_send(wire).is_err() {
                entry.dropped.fetch_add(1, Ordering::Relaxed);
                entry.pending_resync.store(1, Ordering::Relaxed);
                self.missed_events.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(watcher_id = id, pattern = entry.pattern.as_str(), "watcher buffer full, event dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_key_gets_synthetic_initial_event() {
        let manager = WatchManager::new(8);
        let mut watcher = manager.add_watcher("app/config", Some(b"hello".to_vec()));
        let event = watcher.receiver.try_recv().unwrap();
        assert_eq!(event.event_type, "set");
        assert_eq!(event.value.unwrap(), "hello");
    }

    #[test]
    fn wildcard_pattern_receives_matching_publish() {
        let manager = WatchManager::new(8);
        let mut watcher = manager.add_watcher("app/*", None);
        manager.publish(WatchEvent::set("app/config", b"v".to_vec(), Utc::now()));
        let event = watcher.receiver.try_recv().unwrap();
        assert_eq!(event.key, "app/config");
    }

    #[test]
    fn non_matching_key_is_not_delivered() {
        let manager = WatchManager::new(8);
        let mut watcher = manager.add_watcher("app/*", None);
        manager.publish(WatchEvent::set("other/config", b"v".to_vec(), Utc::now()));
        assert!(watcher.receiver.try_recv().is_err());
    }

    #[test]
    fn full_buffer_drops_and_counts_without_blocking() {
        let manager = WatchManager::new(1);
        let watcher = manager.add_watcher("app/*", None);
        manager.publish(WatchEvent::set("app/a", b"1".to_vec(), Utc::now()));
        manager.publish(WatchEvent::set("app/b", b"2".to_vec(), Utc::now()));
        assert_eq!(manager.dropped_count(watcher.id), Some(1));
        assert_eq!(manager.missed_events_total(), 1);
    }

    #[test]
    fn remove_watcher_stops_delivery() {
        let manager = WatchManager::new(8);
        let watcher = manager.add_watcher("app/*", None);
        manager.remove_watcher(watcher.id);
        manager.publish(WatchEvent::set("app/a", b"1".to_vec(), Utc::now()));
        assert_eq!(manager.watcher_count(), 0);
    }

    #[test]
    fn double_star_pattern_matches_nested_keys() {
        let manager = WatchManager::new(8);
        let mut watcher = manager.add_watcher("app/**", None);
        manager.publish(WatchEvent::set("app/a/b/c", b"1".to_vec(), Utc::now()));
        assert!(watcher.receiver.try_recv().is_ok());
    }
}
