//! Agent Cache (C8, spec §4.8): three independent bounded, TTL'd maps.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use konsul_core::model::{KVEntry, Service};
use konsul_protocol::{KVUpdate, ServiceUpdate, UpdateKind};
use parking_lot::RwLock;
use serde::Serialize;

struct TimedEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> TimedEntry<V> {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) > ttl
    }
}

/// A bounded map with per-insertion TTL and LRU eviction once `max_entries`
/// is exceeded. Reader-writer lock around the map; hit/miss counters are
/// atomic (spec §4.8 "Thread-safety").
struct BoundedTtlCache<K: Eq + Hash + Clone, V: Clone> {
    entries: RwLock<HashMap<K, TimedEntry<V>>>,
    order: RwLock<VecDeque<K>>,
    max_entries: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedTtlCache<K, V> {
    fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            order: RwLock::new(VecDeque::new()),
            max_entries: max_entries.max(1),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl, now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts or refreshes `key`, resetting its TTL and recency.
    fn set(&self, key: K, value: V) {
        let mut entries = self.entries.write();
        let is_new = !entries.contains_key(&key);
        entries.insert(key.clone(), TimedEntry { value, inserted_at: Instant::now() });
        let mut order = self.order.write();
        order.retain(|k| k != &key);
        order.push_back(key);
        if is_new && entries.len() > self.max_entries {
            if let Some(oldest) = order.pop_front() {
                entries.remove(&oldest);
            }
        }
    }

    fn remove(&self, key: &K) {
        self.entries.write().remove(key);
        self.order.write().retain(|k| k != key);
    }

    /// Live (non-expired) values whose key matches `pred`.
    fn entries_matching(&self, pred: impl Fn(&K) -> bool) -> Vec<V> {
        let now = Instant::now();
        self.entries
            .read()
            .iter()
            .filter(|(k, e)| pred(k) && !e.is_expired(self.ttl, now))
            .map(|(_, e)| e.value.clone())
            .collect()
    }

    /// Keys (including expired ones) matching `pred`, for bulk removal.
    fn keys_matching(&self, pred: impl Fn(&K) -> bool) -> Vec<K> {
        self.entries.read().keys().filter(|k| pred(k)).cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub services_len: usize,
    pub kv_len: usize,
    pub health_len: usize,
    pub services_hits: u64,
    pub services_misses: u64,
    pub kv_hits: u64,
    pub kv_misses: u64,
    pub health_hits: u64,
    pub health_misses: u64,
}

/// `(name, address, port)`: a service name legitimately resolves to
/// several independent instances (multiple nodes, or one node exposing
/// the same service on different ports), and all of them must be
/// individually cacheable rather than overwriting each other.
type ServiceKey = (String, String, u16);

fn service_key(name: &str, service: &Service) -> ServiceKey {
    (name.to_string(), service.address.clone(), service.port)
}

pub struct AgentCache {
    services: BoundedTtlCache<ServiceKey, Service>,
    kv: BoundedTtlCache<String, KVEntry>,
    health: BoundedTtlCache<String, konsul_core::model::HealthCheck>,
}

impl AgentCache {
    pub fn new(max_entries: usize, service_ttl: Duration, kv_ttl: Duration, health_ttl: Duration) -> Self {
        Self {
            services: BoundedTtlCache::new(max_entries, service_ttl),
            kv: BoundedTtlCache::new(max_entries, kv_ttl),
            health: BoundedTtlCache::new(max_entries, health_ttl),
        }
    }

    /// A single `(address, port)` instance, if cached.
    pub fn get_service_instance(&self, name: &str, address: &str, port: u16) -> Option<Service> {
        self.services.get(&(name.to_string(), address.to_string(), port))
    }

    /// Convenience for single-instance lookups and tests: the first
    /// cached instance under `name`, in no particular order.
    pub fn get_service(&self, name: &str) -> Option<Service> {
        self.get_services(name).into_iter().next()
    }

    /// All instances currently cached under `name`.
    pub fn get_services(&self, name: &str) -> Vec<Service> {
        self.services.entries_matching(|(n, _, _)| n == name)
    }

    pub fn set_service(&self, service: Service) {
        let key = service_key(&service.name, &service);
        self.services.set(key, service);
    }

    pub fn get_kv(&self, key: &str) -> Option<KVEntry> {
        self.kv.get(&key.to_string())
    }

    pub fn set_kv(&self, key: String, entry: KVEntry) {
        self.kv.set(key, entry);
    }

    pub fn get_health(&self, check_id: &str) -> Option<konsul_core::model::HealthCheck> {
        self.health.get(&check_id.to_string())
    }

    pub fn set_health(&self, check_id: String, check: konsul_core::model::HealthCheck) {
        self.health.set(check_id, check);
    }

    /// Applies a service update received from a sync/batch response. Adds
    /// and updates key on `(name, address, port)` so distinct instances of
    /// the same service name never clobber each other; deletes remove
    /// only the matching instance, or every instance of `service_name` if
    /// the update carries no instance detail.
    pub fn apply_service_update(&self, update: &ServiceUpdate) {
        match update.kind {
            UpdateKind::Add | UpdateKind::Update => {
                if let Some(service) = &update.service {
                    self.services.set(service_key(&update.service_name, service), service.clone());
                }
            }
            UpdateKind::Delete => match &update.service {
                Some(incoming) => self.services.remove(&service_key(&update.service_name, incoming)),
                None => {
                    for key in self.services.keys_matching(|(n, _, _)| n == &update.service_name) {
                        self.services.remove(&key);
                    }
                }
            },
        }
    }

    pub fn apply_kv_update(&self, update: &KVUpdate) {
        match update.kind {
            UpdateKind::Add | UpdateKind::Update => {
                if let Some(entry) = &update.entry {
                    self.kv.set(update.key.clone(), entry.clone());
                }
            }
            UpdateKind::Delete => self.kv.remove(&update.key),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            services_len: self.services.len(),
            kv_len: self.kv.len(),
            health_len: self.health.len(),
            services_hits: self.services.hits(),
            services_misses: self.services.misses(),
            kv_hits: self.kv.hits(),
            kv_misses: self.kv.misses(),
            health_hits: self.health.hits(),
            health_misses: self.health.misses(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(name: &str, address: &str, port: u16) -> Service {
        Service { name: name.into(), address: address.into(), port, tags: vec![], meta: Default::default() }
    }

    #[test]
    fn set_then_get_is_a_hit() {
        let cache = AgentCache::new(10, Duration::from_secs(30), Duration::from_secs(30), Duration::from_secs(30));
        cache.set_service(svc("web", "10.0.0.1", 80));
        assert!(cache.get_service("web").is_some());
        assert_eq!(cache.stats().services_hits, 1);
    }

    #[test]
    fn miss_when_absent() {
        let cache = AgentCache::new(10, Duration::from_secs(30), Duration::from_secs(30), Duration::from_secs(30));
        assert!(cache.get_service("ghost").is_none());
        assert_eq!(cache.stats().services_misses, 1);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = AgentCache::new(10, Duration::from_millis(1), Duration::from_secs(30), Duration::from_secs(30));
        cache.set_service(svc("web", "10.0.0.1", 80));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_service("web").is_none());
    }

    #[test]
    fn eviction_drops_least_recently_used() {
        let cache = AgentCache::new(2, Duration::from_secs(30), Duration::from_secs(30), Duration::from_secs(30));
        cache.set_service(svc("a", "1", 1));
        cache.set_service(svc("b", "2", 2));
        cache.set_service(svc("c", "3", 3));
        assert!(cache.get_service("a").is_none());
        assert!(cache.get_service("b").is_some());
        assert!(cache.get_service("c").is_some());
    }

    #[test]
    fn apply_delete_update_removes_matching_instance() {
        let cache = AgentCache::new(10, Duration::from_secs(30), Duration::from_secs(30), Duration::from_secs(30));
        cache.set_service(svc("web", "10.0.0.1", 80));
        cache.apply_service_update(&ServiceUpdate {
            kind: UpdateKind::Delete,
            service_name: "web".into(),
            service: Some(svc("web", "10.0.0.1", 80)),
            entry: None,
        });
        assert!(cache.get_service("web").is_none());
    }

    /// Two instances of the same service name (different node/port) must
    /// coexist instead of overwriting each other's cache slot.
    #[test]
    fn multiple_instances_of_same_name_coexist() {
        let cache = AgentCache::new(10, Duration::from_secs(30), Duration::from_secs(30), Duration::from_secs(30));
        cache.set_service(svc("web", "10.0.0.1", 80));
        cache.set_service(svc("web", "10.0.0.2", 80));
        let instances = cache.get_services("web");
        assert_eq!(instances.len(), 2);
        assert!(cache.get_service_instance("web", "10.0.0.1", 80).is_some());
        assert!(cache.get_service_instance("web", "10.0.0.2", 80).is_some());
    }

    #[test]
    fn deleting_one_instance_leaves_the_other() {
        let cache = AgentCache::new(10, Duration::from_secs(30), Duration::from_secs(30), Duration::from_secs(30));
        cache.set_service(svc("web", "10.0.0.1", 80));
        cache.set_service(svc("web", "10.0.0.2", 80));
        cache.apply_service_update(&ServiceUpdate {
            kind: UpdateKind::Delete,
            service_name: "web".into(),
            service: Some(svc("web", "10.0.0.1", 80)),
            entry: None,
        });
        assert!(cache.get_service_instance("web", "10.0.0.1", 80).is_none());
        assert!(cache.get_service_instance("web", "10.0.0.2", 80).is_some());
    }
}
