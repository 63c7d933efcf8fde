//! KV Store (C2, spec §4.2): single reader-writer lock over a
//! `key -> KVEntry` map with single-key, batch, and CAS variants.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use konsul_core::error::{Error, Result};
use konsul_core::index::IndexCounter;
use konsul_core::model::{KVEntry, WatchEvent};
use konsul_core::sink::WatchSink;
use konsul_protocol::{KVUpdate, UpdateKind};
use parking_lot::{Mutex, RwLock};

use crate::changelog::ChangeLog;

/// `0` is reserved by CAS semantics to mean "create-only" (spec §6 "CAS
/// semantics across the wire").
pub const CAS_CREATE_ONLY: u64 = 0;

pub struct KVStore {
    index: Arc<IndexCounter>,
    inner: RwLock<HashMap<String, KVEntry>>,
    sink: Arc<dyn WatchSink>,
    changelog: Mutex<ChangeLog<KVUpdate>>,
}

impl KVStore {
    pub fn new(index: Arc<IndexCounter>, sink: Arc<dyn WatchSink>, changelog_capacity: usize) -> Self {
        Self {
            index,
            inner: RwLock::new(HashMap::new()),
            sink,
            changelog: Mutex::new(ChangeLog::new(changelog_capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.read().get(key).map(|e| e.value.clone())
    }

    pub fn get_entry(&self, key: &str) -> Option<KVEntry> {
        self.inner.read().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Vec<u8>, flags: u64) -> u64 {
        let mut map = self.inner.write();
        let new_index = self.insert_locked(&mut map, key, value, flags);
        new_index
    }

    /// `expected_index == CAS_CREATE_ONLY` succeeds only when `key` is
    /// absent. Otherwise succeeds only when the current `modify_index`
    /// equals `expected_index` exactly.
    pub fn set_cas(&self, key: &str, value: Vec<u8>, flags: u64, expected_index: u64) -> Result<u64> {
        let mut map = self.inner.write();
        match map.get(key) {
            Some(existing) if expected_index == CAS_CREATE_ONLY => Err(Error::CasConflict {
                key: key.to_string(),
                expected: expected_index,
                current: existing.modify_index,
            }),
            None if expected_index != CAS_CREATE_ONLY => Err(Error::NotFound(key.to_string())),
            Some(existing) if existing.modify_index != expected_index => Err(Error::CasConflict {
                key: key.to_string(),
                expected: expected_index,
                current: existing.modify_index,
            }),
            _ => Ok(self.insert_locked(&mut map, key, value, flags)),
        }
    }

    pub fn delete(&self, key: &str) {
        let mut map = self.inner.write();
        if map.remove(key).is_some() {
            self.publish_delete(key);
        }
    }

    pub fn delete_cas(&self, key: &str, expected_index: u64) -> Result<()> {
        let mut map = self.inner.write();
        match map.get(key) {
            None => Err(Error::NotFound(key.to_string())),
            Some(existing) if existing.modify_index != expected_index => Err(Error::CasConflict {
                key: key.to_string(),
                expected: expected_index,
                current: existing.modify_index,
            }),
            Some(_) => {
                map.remove(key);
                self.publish_delete(key);
                Ok(())
            }
        }
    }

    pub fn batch_get(&self, keys: &[String]) -> HashMap<String, KVEntry> {
        let map = self.inner.read();
        keys.iter()
            .filter_map(|k| map.get(k).map(|e| (k.clone(), e.clone())))
            .collect()
    }

    /// Non-atomic bulk set.
    pub fn batch_set(&self, entries: HashMap<String, Vec<u8>>) -> HashMap<String, u64> {
        let mut map = self.inner.write();
        entries
            .into_iter()
            .map(|(k, v)| {
                let idx = self.insert_locked(&mut map, &k, v, 0);
                (k, idx)
            })
            .collect()
    }

    /// Non-atomic bulk delete.
    pub fn batch_delete(&self, keys: &[String]) {
        let mut map = self.inner.write();
        for key in keys {
            if map.remove(key).is_some() {
                self.publish_delete(key);
            }
        }
    }

    /// All-or-nothing: verifies every expected index against the current
    /// writer-lock-protected state before applying any change. On conflict,
    /// no key is mutated and every offending key is reported.
    pub fn batch_set_cas(
        &self,
        entries: HashMap<String, Vec<u8>>,
        expected_indices: HashMap<String, u64>,
    ) -> std::result::Result<HashMap<String, u64>, Vec<String>> {
        let mut map = self.inner.write();
        let conflicts: Vec<String> = entries
            .keys()
            .filter(|k| {
                let expected = expected_indices.get(*k).copied().unwrap_or(CAS_CREATE_ONLY);
                match map.get(*k) {
                    Some(existing) => existing.modify_index != expected,
                    None => expected != CAS_CREATE_ONLY,
                }
            })
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            return Err(conflicts);
        }
        Ok(entries
            .into_iter()
            .map(|(k, v)| {
                let idx = self.insert_locked(&mut map, &k, v, 0);
                (k, idx)
            })
            .collect())
    }

    pub fn batch_delete_cas(
        &self,
        keys: &[String],
        expected_indices: HashMap<String, u64>,
    ) -> std::result::Result<(), Vec<String>> {
        let mut map = self.inner.write();
        let conflicts: Vec<String> = keys
            .iter()
            .filter(|k| {
                let expected = expected_indices.get(*k).copied().unwrap_or(CAS_CREATE_ONLY);
                !matches!(map.get(*k), Some(existing) if existing.modify_index == expected)
            })
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            return Err(conflicts);
        }
        for key in keys {
            map.remove(key);
            self.publish_delete(key);
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// Keys currently present under any of `prefixes` (empty = all keys).
    pub fn list_under(&self, prefixes: &[String]) -> Vec<(String, KVEntry)> {
        let map = self.inner.read();
        map.iter()
            .filter(|(k, _)| prefixes.is_empty() || prefixes.iter().any(|p| k.starts_with(p.as_str())))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Changes since `since_index`, or `None` if the caller must fall back
    /// to a full snapshot (see `ChangeLog::since`).
    pub fn changes_since(&self, since_index: u64) -> Option<Vec<KVUpdate>> {
        self.changelog.lock().since(since_index)
    }

    pub fn current_index(&self) -> u64 {
        self.index.current()
    }

    // ── internals ─────────────────────────────────────────────────────

    fn insert_locked(&self, map: &mut HashMap<String, KVEntry>, key: &str, value: Vec<u8>, flags: u64) -> u64 {
        let new_index = self.index.next();
        let create_index = map.get(key).map(|e| e.create_index).unwrap_or(new_index);
        let entry = KVEntry {
            value: value.clone(),
            flags,
            create_index,
            modify_index: new_index,
        };
        let kind = if create_index == new_index { UpdateKind::Add } else { UpdateKind::Update };
        map.insert(key.to_string(), entry.clone());
        self.changelog.lock().record(new_index, KVUpdate { kind, key: key.to_string(), entry: Some(entry) });
        self.sink.publish(WatchEvent::set(key, value, Utc::now()));
        tracing::debug!(key, modify_index = new_index, "kv set");
        new_index
    }

    fn publish_delete(&self, key: &str) {
        let idx = self.index.next();
        self.changelog.lock().record(idx, KVUpdate { kind: UpdateKind::Delete, key: key.to_string(), entry: None });
        self.sink.publish(WatchEvent::delete(key, Utc::now()));
        tracing::debug!(key, modify_index = idx, "kv delete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use konsul_core::sink::NullSink;

    fn store() -> KVStore {
        KVStore::new(Arc::new(IndexCounter::new()), Arc::new(NullSink), 100)
    }

    #[test]
    fn set_then_get_matches() {
        let s = store();
        s.set("k", b"v1".to_vec(), 0);
        assert_eq!(s.get("k"), Some(b"v1".to_vec()));
    }

    #[test]
    fn get_and_get_entry_agree() {
        let s = store();
        s.set("k", b"v1".to_vec(), 0);
        let entry = s.get_entry("k").unwrap();
        assert_eq!(entry.value, s.get("k").unwrap());
    }

    #[test]
    fn indices_strictly_increase() {
        let s = store();
        let i1 = s.set("a", b"1".to_vec(), 0);
        let i2 = s.set("b", b"2".to_vec(), 0);
        let i3 = s.set("a", b"3".to_vec(), 0);
        assert!(i2 > i1);
        assert!(i3 > i2);
    }

    #[test]
    fn create_index_preserved_across_updates() {
        let s = store();
        s.set("k", b"1".to_vec(), 0);
        let first = s.get_entry("k").unwrap();
        s.set("k", b"2".to_vec(), 0);
        let second = s.get_entry("k").unwrap();
        assert_eq!(first.create_index, second.create_index);
        assert!(second.modify_index > first.modify_index);
    }

    #[test]
    fn set_delete_get_is_not_found() {
        let s = store();
        s.set("k", b"v".to_vec(), 0);
        s.delete("k");
        assert_eq!(s.get("k"), None);
    }

    #[test]
    fn delete_is_idempotent() {
        let s = store();
        s.delete("missing");
        s.delete("missing");
    }

    #[test]
    fn cas_create_only_succeeds_once() {
        let s = store();
        let r1 = s.set_cas("k", b"v1".to_vec(), 0, CAS_CREATE_ONLY);
        assert!(r1.is_ok());
        let r2 = s.set_cas("k", b"v2".to_vec(), 0, CAS_CREATE_ONLY);
        assert!(matches!(r2, Err(Error::CasConflict { .. })));
        assert_eq!(s.get("k"), Some(b"v1".to_vec()));
    }

    #[test]
    fn cas_requires_exact_index_match() {
        let s = store();
        let idx = s.set("k", b"v1".to_vec(), 0);
        let bad = s.set_cas("k", b"v2".to_vec(), 0, idx + 1);
        assert!(matches!(bad, Err(Error::CasConflict { .. })));
        let ok = s.set_cas("k", b"v2".to_vec(), 0, idx);
        assert!(ok.is_ok());
        assert_eq!(s.get("k"), Some(b"v2".to_vec()));
    }

    #[test]
    fn cas_on_absent_key_with_nonzero_expected_is_not_found() {
        let s = store();
        let r = s.set_cas("missing", b"v".to_vec(), 0, 7);
        assert!(matches!(r, Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_cas_conflict_and_success() {
        let s = store();
        let idx = s.set("k", b"v".to_vec(), 0);
        assert!(s.delete_cas("k", idx + 1).is_err());
        assert!(s.delete_cas("k", idx).is_ok());
        assert_eq!(s.get("k"), None);
    }

    #[test]
    fn batch_set_cas_is_all_or_nothing() {
        let s = store();
        let idx_a = s.set("a", b"1".to_vec(), 0);
        s.set("b", b"1".to_vec(), 0);

        let mut entries = HashMap::new();
        entries.insert("a".to_string(), b"2".to_vec());
        entries.insert("b".to_string(), b"2".to_vec());
        let mut expected = HashMap::new();
        expected.insert("a".to_string(), idx_a);
        expected.insert("b".to_string(), idx_a); // wrong on purpose

        let result = s.batch_set_cas(entries, expected);
        assert!(result.is_err());
        // Neither key should have changed.
        assert_eq!(s.get("a"), Some(b"1".to_vec()));
        assert_eq!(s.get("b"), Some(b"1".to_vec()));
    }

    #[test]
    fn list_reflects_live_keys() {
        let s = store();
        s.set("a", b"1".to_vec(), 0);
        s.set("b", b"1".to_vec(), 0);
        s.delete("a");
        let keys = s.list();
        assert_eq!(keys, vec!["b".to_string()]);
    }

    #[test]
    fn cas_create_racers_exactly_one_wins() {
        let s = Arc::new(store());
        let s1 = s.clone();
        let s2 = s.clone();
        let t1 = std::thread::spawn(move || s1.set_cas("cfg/app", b"v1".to_vec(), 0, CAS_CREATE_ONLY));
        let t2 = std::thread::spawn(move || s2.set_cas("cfg/app", b"v2".to_vec(), 0, CAS_CREATE_ONLY));
        let r1 = t1.join().unwrap();
        let r2 = t2.join().unwrap();
        assert!(r1.is_ok() ^ r2.is_ok(), "exactly one racer must win");
        let winner = s.get("cfg/app").unwrap();
        assert!(winner == b"v1".to_vec() || winner == b"v2".to_vec());
    }
}
