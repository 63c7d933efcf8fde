//! Service Store (C3, spec §4.3): service registry with tag/metadata
//! secondary indexes, TTL expiry, and CAS variants.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use konsul_core::config::StoreConfig;
use konsul_core::error::{Error, Result};
use konsul_core::index::IndexCounter;
use konsul_core::model::{Service, ServiceEntry, WatchEvent};
use konsul_core::sink::WatchSink;
use konsul_protocol::{ServiceUpdate, UpdateKind};
use parking_lot::{Mutex, RwLock};

use crate::changelog::ChangeLog;

pub struct ServiceStore {
    index: Arc<IndexCounter>,
    limits: StoreConfig,
    sink: Arc<dyn WatchSink>,
    entries: RwLock<HashMap<String, ServiceEntry>>,
    tag_index: RwLock<HashMap<String, HashSet<String>>>,
    meta_index: RwLock<HashMap<(String, String), HashSet<String>>>,
    /// `(expires_at, name) -> ()`, ordered ascending so `sweep_expired`
    /// only ever visits entries that are actually due (spec §4.3
    /// "O(expired)"), never the whole map.
    expiry_index: RwLock<BTreeMap<(DateTime<Utc>, String), ()>>,
    changelog: Mutex<ChangeLog<ServiceUpdate>>,
}

impl ServiceStore {
    pub fn new(index: Arc<IndexCounter>, sink: Arc<dyn WatchSink>, limits: StoreConfig) -> Self {
        let capacity = limits.change_log_capacity;
        Self {
            index,
            limits,
            sink,
            entries: RwLock::new(HashMap::new()),
            tag_index: RwLock::new(HashMap::new()),
            meta_index: RwLock::new(HashMap::new()),
            expiry_index: RwLock::new(BTreeMap::new()),
            changelog: Mutex::new(ChangeLog::new(capacity)),
        }
    }

    pub fn validate(&self, service: &Service) -> Result<()> {
        if service.name.is_empty() {
            return Err(Error::InvalidArgument("service name must not be empty".into()));
        }
        if service.address.is_empty() {
            return Err(Error::InvalidArgument("service address must not be empty".into()));
        }
        if service.port == 0 {
            return Err(Error::InvalidArgument("service port must be in 1..65535".into()));
        }
        if service.tags.len() > self.limits.max_tags {
            return Err(Error::InvalidArgument(format!(
                "too many tags: {} > {}",
                service.tags.len(),
                self.limits.max_tags
            )));
        }
        if service.tags.iter().any(|t| t.len() > self.limits.max_tag_len) {
            return Err(Error::InvalidArgument("tag exceeds max length".into()));
        }
        if service.meta.len() > self.limits.max_meta_entries {
            return Err(Error::InvalidArgument(format!(
                "too many meta entries: {} > {}",
                service.meta.len(),
                self.limits.max_meta_entries
            )));
        }
        if service
            .meta
            .iter()
            .any(|(k, v)| k.len() > self.limits.max_meta_len || v.len() > self.limits.max_meta_len)
        {
            return Err(Error::InvalidArgument("meta key/value exceeds max length".into()));
        }
        Ok(())
    }

    pub fn register(&self, service: Service, ttl_seconds: u64, now: DateTime<Utc>) -> Result<u64> {
        self.validate(&service)?;
        let mut entries = self.entries.write();
        Ok(self.insert_locked(&mut entries, service, ttl_seconds, now))
    }

    pub fn register_cas(
        &self,
        service: Service,
        ttl_seconds: u64,
        expected_index: u64,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        self.validate(&service)?;
        let mut entries = self.entries.write();
        match entries.get(&service.name) {
            Some(existing) if expected_index == 0 => Err(Error::CasConflict {
                key: service.name.clone(),
                expected: expected_index,
                current: existing.modify_index,
            }),
            None if expected_index != 0 => Err(Error::NotFound(service.name.clone())),
            Some(existing) if existing.modify_index != expected_index => Err(Error::CasConflict {
                key: service.name.clone(),
                expected: expected_index,
                current: existing.modify_index,
            }),
            _ => Ok(self.insert_locked(&mut entries, service, ttl_seconds, now)),
        }
    }

    pub fn deregister(&self, name: &str) {
        let mut entries = self.entries.write();
        if let Some(removed) = entries.remove(name) {
            self.expiry_index.write().remove(&(removed.expires_at, name.to_string()));
            self.unindex_locked(&removed.service, name);
            self.publish_deregister(name);
        }
    }

    pub fn deregister_cas(&self, name: &str, expected_index: u64) -> Result<()> {
        let mut entries = self.entries.write();
        match entries.get(name) {
            None => Err(Error::NotFound(name.to_string())),
            Some(existing) if existing.modify_index != expected_index => Err(Error::CasConflict {
                key: name.to_string(),
                expected: expected_index,
                current: existing.modify_index,
            }),
            Some(_) => {
                let removed = entries.remove(name).unwrap();
                self.expiry_index.write().remove(&(removed.expires_at, name.to_string()));
                self.unindex_locked(&removed.service, name);
                self.publish_deregister(name);
                Ok(())
            }
        }
    }

    /// Extends `expires_at` for an existing registration. Returns `false`
    /// if the service is unknown (already deregistered or expired and
    /// swept).
    pub fn heartbeat(&self, name: &str, ttl_seconds: u64, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            Some(entry) => {
                let old_expires_at = entry.expires_at;
                let new_expires_at = now + chrono::Duration::seconds(ttl_seconds as i64);
                entry.expires_at = new_expires_at;
                entry.modify_index = self.index.next();
                let mut expiry_index = self.expiry_index.write();
                expiry_index.remove(&(old_expires_at, name.to_string()));
                expiry_index.insert((new_expires_at, name.to_string()), ());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<Service> {
        let now = Utc::now();
        self.entries.read().get(name).filter(|e| !e.is_expired(now)).map(|e| e.service.clone())
    }

    pub fn get_entry(&self, name: &str) -> Option<ServiceEntry> {
        let now = Utc::now();
        self.entries.read().get(name).filter(|e| !e.is_expired(now)).cloned()
    }

    pub fn list(&self) -> Vec<ServiceEntry> {
        let now = Utc::now();
        self.entries.read().values().filter(|e| !e.is_expired(now)).cloned().collect()
    }

    /// AND semantics: a service must carry every listed tag.
    pub fn query_by_tags(&self, tags: &[String]) -> Vec<ServiceEntry> {
        if tags.is_empty() {
            return self.list();
        }
        let now = Utc::now();
        let entries = self.entries.read();
        let index = self.tag_index.read();
        self.intersect_names(&index, tags)
            .into_iter()
            .filter_map(|name| entries.get(&name).cloned())
            .filter(|e| !e.is_expired(now))
            .collect()
    }

    /// AND semantics on key=value pairs.
    pub fn query_by_metadata(&self, filters: &[(String, String)]) -> Vec<ServiceEntry> {
        if filters.is_empty() {
            return self.list();
        }
        let now = Utc::now();
        let entries = self.entries.read();
        let index = self.meta_index.read();
        let mut candidates: Option<HashSet<String>> = None;
        for filter in filters {
            let names = index.get(filter).cloned().unwrap_or_default();
            candidates = Some(match candidates {
                None => names,
                Some(acc) => acc.intersection(&names).cloned().collect(),
            });
        }
        candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|name| entries.get(&name).cloned())
            .filter(|e| !e.is_expired(now))
            .collect()
    }

    pub fn query_by_tags_and_metadata(&self, tags: &[String], filters: &[(String, String)]) -> Vec<ServiceEntry> {
        let now = Utc::now();
        let by_tags: HashSet<String> = self.query_by_tags(tags).into_iter().map(|e| e.service.name).collect();
        let by_meta: HashSet<String> = self.query_by_metadata(filters).into_iter().map(|e| e.service.name).collect();
        let entries = self.entries.read();
        by_tags
            .intersection(&by_meta)
            .filter_map(|name| entries.get(name).cloned())
            .filter(|e| !e.is_expired(now))
            .collect()
    }

    /// O(expired): walks the `expiry_index` in ascending order and stops
    /// at the first entry that isn't due yet, so cost is proportional to
    /// the number of entries actually removed, not the map's total size.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<(DateTime<Utc>, String)> = {
            let expiry_index = self.expiry_index.read();
            expiry_index.range(..(now, String::new())).map(|(k, _)| k.clone()).collect()
        };
        if due.is_empty() {
            return 0;
        }
        let mut entries = self.entries.write();
        let mut expiry_index = self.expiry_index.write();
        let mut removed = 0;
        for (expires_at, name) in due {
            expiry_index.remove(&(expires_at, name.clone()));
            if let Some(entry) = entries.remove(&name) {
                self.unindex_locked(&entry.service, &name);
                self.publish_deregister(&name);
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "expiry sweep removed services");
        }
        removed
    }

    pub fn changes_since(&self, since_index: u64) -> Option<Vec<ServiceUpdate>> {
        self.changelog.lock().since(since_index)
    }

    // ── internals ─────────────────────────────────────────────────────

    fn intersect_names(&self, index: &HashMap<String, HashSet<String>>, tags: &[String]) -> HashSet<String> {
        let mut iter = tags.iter();
        let first = match iter.next() {
            Some(t) => index.get(t).cloned().unwrap_or_default(),
            None => return HashSet::new(),
        };
        iter.fold(first, |acc, tag| {
            let names = index.get(tag).cloned().unwrap_or_default();
            acc.intersection(&names).cloned().collect()
        })
    }

    fn insert_locked(
        &self,
        entries: &mut HashMap<String, ServiceEntry>,
        service: Service,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> u64 {
        let name = service.name.clone();
        if let Some(existing) = entries.get(&name) {
            self.unindex_locked(&existing.service, &name);
            self.expiry_index.write().remove(&(existing.expires_at, name.clone()));
        }
        let new_index = self.index.next();
        let create_index = entries.get(&name).map(|e| e.create_index).unwrap_or(new_index);
        let expires_at = now + chrono::Duration::seconds(ttl_seconds as i64);
        let entry = ServiceEntry { service: service.clone(), expires_at, create_index, modify_index: new_index };
        self.index_locked(&service, &name);
        self.expiry_index.write().insert((expires_at, name.clone()), ());
        entries.insert(name.clone(), entry.clone());
        let kind = if create_index == new_index { UpdateKind::Add } else { UpdateKind::Update };
        self.changelog.lock().record(
            new_index,
            ServiceUpdate { kind, service_name: name.clone(), service: Some(service), entry: Some(entry) },
        );
        self.sink.publish(WatchEvent::set(format!("services/{name}"), Vec::new(), now));
        tracing::debug!(service = %name, modify_index = new_index, "service registered");
        new_index
    }

    fn index_locked(&self, service: &Service, name: &str) {
        let mut tag_index = self.tag_index.write();
        for tag in &service.tags {
            tag_index.entry(tag.clone()).or_default().insert(name.to_string());
        }
        let mut meta_index = self.meta_index.write();
        for (k, v) in &service.meta {
            meta_index.entry((k.clone(), v.clone())).or_default().insert(name.to_string());
        }
    }

    fn unindex_locked(&self, service: &Service, name: &str) {
        let mut tag_index = self.tag_index.write();
        for tag in &service.tags {
            if let Some(set) = tag_index.get_mut(tag) {
                set.remove(name);
                if set.is_empty() {
                    tag_index.remove(tag);
                }
            }
        }
        let mut meta_index = self.meta_index.write();
        for (k, v) in &service.meta {
            let key = (k.clone(), v.clone());
            if let Some(set) = meta_index.get_mut(&key) {
                set.remove(name);
                if set.is_empty() {
                    meta_index.remove(&key);
                }
            }
        }
    }

    fn publish_deregister(&self, name: &str) {
        let idx = self.index.next();
        self.changelog.lock().record(
            idx,
            ServiceUpdate { kind: UpdateKind::Delete, service_name: name.to_string(), service: None, entry: None },
        );
        self.sink.publish(WatchEvent::delete(format!("services/{name}"), Utc::now()));
        tracing::debug!(service = name, modify_index = idx, "service deregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use konsul_core::sink::NullSink;

    fn svc(name: &str, tags: &[&str], meta: &[(&str, &str)]) -> Service {
        Service {
            name: name.to_string(),
            address: "10.0.0.1".to_string(),
            port: 80,
            tags: tags.iter().map(|s| s.to_string()).collect(),
            meta: meta.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    fn store() -> ServiceStore {
        ServiceStore::new(Arc::new(IndexCounter::new()), Arc::new(NullSink), StoreConfig::default())
    }

    #[test]
    fn register_then_get() {
        let s = store();
        s.register(svc("web", &["primary"], &[]), 30, Utc::now()).unwrap();
        assert!(s.get("web").is_some());
    }

    #[test]
    fn register_rejects_invalid_port() {
        let s = store();
        let bad = svc("web", &[], &[]).clone();
        let mut bad = bad;
        bad.port = 0;
        assert!(matches!(s.register(bad, 30, Utc::now()), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn register_then_deregister_is_noop_on_end_state() {
        let s = store();
        s.register(svc("web", &[], &[]), 30, Utc::now()).unwrap();
        s.deregister("web");
        assert!(s.get("web").is_none());
    }

    #[test]
    fn heartbeat_keeps_service_present() {
        let s = store();
        let now = Utc::now();
        s.register(svc("web", &[], &[]), 1, now).unwrap();
        assert!(s.heartbeat("web", 1, now));
        assert!(s.get("web").is_some());
    }

    #[test]
    fn expired_service_absent_after_sweep() {
        let s = store();
        let now = Utc::now();
        s.register(svc("tmp", &[], &[]), 0, now - chrono::Duration::seconds(1)).unwrap();
        let removed = s.sweep_expired(now);
        assert_eq!(removed, 1);
        assert!(s.get("tmp").is_none());
        assert!(s.list().is_empty());
    }

    #[test]
    fn query_by_tags_is_and_semantics() {
        let s = store();
        s.register(svc("a", &["x", "y"], &[]), 30, Utc::now()).unwrap();
        s.register(svc("b", &["x"], &[]), 30, Utc::now()).unwrap();
        let result = s.query_by_tags(&["x".to_string(), "y".to_string()]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].service.name, "a");
    }

    #[test]
    fn query_by_metadata_is_and_semantics() {
        let s = store();
        s.register(svc("a", &[], &[("env", "prod"), ("tier", "web")]), 30, Utc::now()).unwrap();
        s.register(svc("b", &[], &[("env", "prod")]), 30, Utc::now()).unwrap();
        let result = s.query_by_metadata(&[("env".to_string(), "prod".to_string()), ("tier".to_string(), "web".to_string())]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].service.name, "a");
    }

    #[test]
    fn query_combinator_intersects_both() {
        let s = store();
        s.register(svc("a", &["x"], &[("env", "prod")]), 30, Utc::now()).unwrap();
        s.register(svc("b", &["x"], &[("env", "dev")]), 30, Utc::now()).unwrap();
        let result = s.query_by_tags_and_metadata(&["x".to_string()], &[("env".to_string(), "prod".to_string())]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].service.name, "a");
    }

    #[test]
    fn cas_register_conflict() {
        let s = store();
        let idx = s.register(svc("web", &[], &[]), 30, Utc::now()).unwrap();
        let bad = s.register_cas(svc("web", &[], &[]), 30, idx + 1, Utc::now());
        assert!(matches!(bad, Err(Error::CasConflict { .. })));
        let ok = s.register_cas(svc("web", &[], &[]), 30, idx, Utc::now());
        assert!(ok.is_ok());
    }

    #[test]
    fn secondary_index_cleared_on_deregister() {
        let s = store();
        s.register(svc("a", &["x"], &[("env", "prod")]), 30, Utc::now()).unwrap();
        s.deregister("a");
        assert!(s.query_by_tags(&["x".to_string()]).is_empty());
        assert!(s.query_by_metadata(&[("env".to_string(), "prod".to_string())]).is_empty());
    }

    #[test]
    fn reregister_updates_indexes_transactionally() {
        let s = store();
        s.register(svc("a", &["old"], &[]), 30, Utc::now()).unwrap();
        s.register(svc("a", &["new"], &[]), 30, Utc::now()).unwrap();
        assert!(s.query_by_tags(&["old".to_string()]).is_empty());
        assert_eq!(s.query_by_tags(&["new".to_string()]).len(), 1);
    }
}
