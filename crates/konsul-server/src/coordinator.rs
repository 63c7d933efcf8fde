//! Server Coordinator (C11, spec §4.11): the authoritative C2/C3 plus the
//! connected-agent registry, sync/batch/health endpoints, and the
//! optional replication hook in front of every write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use konsul_core::error::{Error, Result};
use konsul_core::index::IndexCounter;
use konsul_core::model::Service;
use konsul_protocol::{
    AgentInfo, BatchUpdateRequest, BatchUpdateResponse, Command, CommandTag, HealthUpdate, ServiceUpdate,
    SyncRequest, SyncResponse, UpdateKind,
};
use konsul_store::{KVStore, ServiceStore};
use parking_lot::RwLock;

use crate::replication::ReplicationAdapter;

struct AgentRecord {
    info: AgentInfo,
    last_seen: DateTime<Utc>,
    last_sync_index: i64,
    registered_at: DateTime<Utc>,
}

pub struct ServerCoordinator {
    kv: Arc<KVStore>,
    services: Arc<ServiceStore>,
    index: Arc<IndexCounter>,
    replication: Option<Arc<dyn ReplicationAdapter>>,
    replication_timeout: Duration,
    agents: RwLock<HashMap<String, AgentRecord>>,
    default_service_ttl_seconds: u64,
}

impl ServerCoordinator {
    pub fn new(
        kv: Arc<KVStore>,
        services: Arc<ServiceStore>,
        index: Arc<IndexCounter>,
        replication: Option<Arc<dyn ReplicationAdapter>>,
        replication_timeout: Duration,
        default_service_ttl_seconds: u64,
    ) -> Self {
        Self {
            kv,
            services,
            index,
            replication,
            replication_timeout,
            agents: RwLock::new(HashMap::new()),
            default_service_ttl_seconds,
        }
    }

    pub fn kv(&self) -> &Arc<KVStore> {
        &self.kv
    }

    pub fn services(&self) -> &Arc<ServiceStore> {
        &self.services
    }

    async fn replicate(&self, tag: CommandTag, payload: serde_json::Value) -> Result<()> {
        if let Some(adapter) = &self.replication {
            adapter.apply(Command { tag, payload }, self.replication_timeout).await?;
        }
        Ok(())
    }

    // ── KV write path ────────────────────────────────────────────────

    pub async fn kv_set(&self, key: &str, value: Vec<u8>, flags: u64) -> Result<u64> {
        self.replicate(CommandTag::KvSetWithFlags, serde_json::json!({"key": key, "flags": flags})).await?;
        Ok(self.kv.set(key, value, flags))
    }

    pub async fn kv_set_cas(&self, key: &str, value: Vec<u8>, flags: u64, expected: u64) -> Result<u64> {
        self.replicate(CommandTag::KvSetCas, serde_json::json!({"key": key, "expected": expected})).await?;
        self.kv.set_cas(key, value, flags, expected)
    }

    pub async fn kv_delete(&self, key: &str) -> Result<()> {
        self.replicate(CommandTag::KvDelete, serde_json::json!({"key": key})).await?;
        self.kv.delete(key);
        Ok(())
    }

    pub async fn kv_delete_cas(&self, key: &str, expected: u64) -> Result<()> {
        self.replicate(CommandTag::KvDeleteCas, serde_json::json!({"key": key, "expected": expected})).await?;
        self.kv.delete_cas(key, expected)
    }

    pub async fn kv_batch_set(&self, entries: HashMap<String, Vec<u8>>) -> Result<HashMap<String, u64>> {
        self.replicate(CommandTag::KvBatchSet, serde_json::json!({"keys": entries.keys().collect::<Vec<_>>()})).await?;
        Ok(self.kv.batch_set(entries))
    }

    pub async fn kv_batch_delete(&self, keys: Vec<String>) -> Result<()> {
        self.replicate(CommandTag::KvBatchDelete, serde_json::json!({"keys": keys})).await?;
        self.kv.batch_delete(&keys);
        Ok(())
    }

    pub async fn kv_batch_set_cas(
        &self,
        entries: HashMap<String, Vec<u8>>,
        expected: HashMap<String, u64>,
    ) -> Result<HashMap<String, u64>> {
        self.replicate(CommandTag::KvBatchSetCas, serde_json::json!({"keys": entries.keys().collect::<Vec<_>>()})).await?;
        self.kv.batch_set_cas(entries, expected).map_err(|conflicts| Error::CasConflict {
            key: conflicts.join(","),
            expected: 0,
            current: 0,
        })
    }

    pub async fn kv_batch_delete_cas(&self, keys: Vec<String>, expected: HashMap<String, u64>) -> Result<()> {
        self.replicate(CommandTag::KvBatchDeleteCas, serde_json::json!({"keys": keys})).await?;
        self.kv.batch_delete_cas(&keys, expected).map_err(|conflicts| Error::CasConflict {
            key: conflicts.join(","),
            expected: 0,
            current: 0,
        })
    }

    // ── Service write path ───────────────────────────────────────────

    pub async fn service_register(&self, service: Service, ttl_seconds: Option<u64>) -> Result<u64> {
        let ttl = ttl_seconds.unwrap_or(self.default_service_ttl_seconds);
        self.replicate(CommandTag::ServiceRegister, serde_json::json!({"name": service.name})).await?;
        self.services.register(service, ttl, Utc::now())
    }

    pub async fn service_register_cas(&self, service: Service, ttl_seconds: Option<u64>, expected: u64) -> Result<u64> {
        let ttl = ttl_seconds.unwrap_or(self.default_service_ttl_seconds);
        self.replicate(CommandTag::ServiceRegisterCas, serde_json::json!({"name": service.name, "expected": expected})).await?;
        self.services.register_cas(service, ttl, expected, Utc::now())
    }

    pub async fn service_deregister(&self, name: &str) -> Result<()> {
        self.replicate(CommandTag::ServiceDeregister, serde_json::json!({"name": name})).await?;
        self.services.deregister(name);
        Ok(())
    }

    pub async fn service_deregister_cas(&self, name: &str, expected: u64) -> Result<()> {
        self.replicate(CommandTag::ServiceDeregisterCas, serde_json::json!({"name": name, "expected": expected})).await?;
        self.services.deregister_cas(name, expected)
    }

    pub async fn service_heartbeat(&self, name: &str, ttl_seconds: Option<u64>) -> Result<bool> {
        let ttl = ttl_seconds.unwrap_or(self.default_service_ttl_seconds);
        self.replicate(CommandTag::ServiceHeartbeat, serde_json::json!({"name": name})).await?;
        Ok(self.services.heartbeat(name, ttl, Utc::now()))
    }

    // ── Agent registry ───────────────────────────────────────────────

    /// Idempotent: a re-register refreshes the existing record.
    pub fn register_agent(&self, info: AgentInfo) {
        let mut agents = self.agents.write();
        let now = Utc::now();
        agents
            .entry(info.id.clone())
            .and_modify(|rec| {
                rec.info = info.clone();
                rec.last_seen = now;
            })
            .or_insert_with(|| AgentRecord { info, last_seen: now, last_sync_index: 0, registered_at: now });
    }

    pub fn agent_count(&self) -> usize {
        self.agents.read().len()
    }

    /// Removes registry entries unseen for longer than `stale_timeout`.
    pub fn reap_stale_agents(&self, stale_timeout: chrono::Duration) -> usize {
        let now = Utc::now();
        let mut agents = self.agents.write();
        let before = agents.len();
        agents.retain(|_, rec| now - rec.last_seen <= stale_timeout);
        before - agents.len()
    }

    pub async fn sync(&self, request: SyncRequest) -> SyncResponse {
        if let Some(rec) = self.agents.write().get_mut(&request.agent_id) {
            rec.last_seen = Utc::now();
            rec.last_sync_index = request.last_sync_index;
        }

        let full = request.full_sync || request.last_sync_index == 0;
        let prefixes = request.watched_prefixes.unwrap_or_default();

        if full {
            return self.full_snapshot(&prefixes);
        }

        // Delta path: fall back to a full snapshot when the change logs
        // no longer cover `last_sync_index` (invariant I5 holds either
        // way — see SPEC_FULL.md Open Question 1).
        let since = request.last_sync_index.max(0) as u64;
        match (self.services.changes_since(since), self.kv.changes_since(since)) {
            (Some(service_updates), Some(kv_updates)) => SyncResponse {
                current_index: self.index.current() as i64,
                service_updates,
                kv_updates,
                health_updates: Vec::new(),
            },
            _ => self.full_snapshot(&prefixes),
        }
    }

    fn full_snapshot(&self, prefixes: &[String]) -> SyncResponse {
        let service_updates = self
            .services
            .list()
            .into_iter()
            .map(|entry| ServiceUpdate {
                kind: UpdateKind::Add,
                service_name: entry.service.name.clone(),
                service: Some(entry.service.clone()),
                entry: Some(entry),
            })
            .collect();
        let kv_updates = self
            .kv
            .list_under(prefixes)
            .into_iter()
            .map(|(key, entry)| konsul_protocol::KVUpdate { kind: UpdateKind::Add, key, entry: Some(entry) })
            .collect();
        SyncResponse {
            current_index: self.index.current() as i64,
            service_updates,
            kv_updates,
            health_updates: Vec::new(),
        }
    }

    /// Applies each update in order; invalid items are logged and
    /// skipped rather than rejecting the whole batch.
    pub async fn batch_update(&self, request: BatchUpdateRequest) -> BatchUpdateResponse {
        let mut applied = 0;
        let mut skipped = 0;
        for update in request.updates {
            let result = match update.kind {
                UpdateKind::Add | UpdateKind::Update => match update.service {
                    Some(service) => self.service_register(service, None).await.map(|_| ()),
                    None => Err(Error::InvalidArgument(format!("update for {} missing service body", update.service_name))),
                },
                UpdateKind::Delete => self.service_deregister(&update.service_name).await,
            };
            match result {
                Ok(()) => applied += 1,
                Err(err) => {
                    tracing::warn!(service = %update.service_name, error = %err, "skipping invalid batch update");
                    skipped += 1;
                }
            }
        }
        BatchUpdateResponse { applied, skipped, current_index: self.index.current() as i64 }
    }

    /// Routed to observability only (spec §4.11 "acceptable to be a sink
    /// that does nothing semantically").
    pub fn health_update(&self, update: HealthUpdate) {
        tracing::info!(
            service_id = %update.service_id,
            check_id = %update.check_id,
            status = ?update.status,
            "agent health update"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use konsul_core::sink::NullSink;

    fn coordinator() -> ServerCoordinator {
        let index = Arc::new(IndexCounter::new());
        let kv = Arc::new(KVStore::new(index.clone(), Arc::new(NullSink), 100));
        let services = Arc::new(ServiceStore::new(index.clone(), Arc::new(NullSink), Default::default()));
        ServerCoordinator::new(kv, services, index, None, Duration::from_secs(5), 30)
    }

    fn agent_info(id: &str) -> AgentInfo {
        AgentInfo {
            id: id.to_string(),
            node_name: "node".into(),
            node_ip: None,
            datacenter: None,
            metadata: Default::default(),
            started_at: Utc::now(),
            version: "0.1.0".into(),
        }
    }

    #[tokio::test]
    async fn register_agent_is_idempotent() {
        let coord = coordinator();
        coord.register_agent(agent_info("a1"));
        coord.register_agent(agent_info("a1"));
        assert_eq!(coord.agent_count(), 1);
    }

    #[tokio::test]
    async fn full_sync_returns_every_entry() {
        let coord = coordinator();
        coord.kv_set("app/a", b"1".to_vec(), 0).await.unwrap();
        coord
            .service_register(Service { name: "web".into(), address: "1.1.1.1".into(), port: 80, tags: vec![], meta: Default::default() }, None)
            .await
            .unwrap();
        let response = coord
            .sync(SyncRequest { agent_id: "a1".into(), last_sync_index: 0, watched_prefixes: None, full_sync: false })
            .await;
        assert_eq!(response.kv_updates.len(), 1);
        assert_eq!(response.service_updates.len(), 1);
    }

    #[tokio::test]
    async fn batch_update_skips_invalid_items_but_applies_rest() {
        let coord = coordinator();
        let request = BatchUpdateRequest {
            agent_id: "a1".into(),
            updates: vec![
                ServiceUpdate { kind: UpdateKind::Add, service_name: "bad".into(), service: None, entry: None },
                ServiceUpdate {
                    kind: UpdateKind::Add,
                    service_name: "good".into(),
                    service: Some(Service { name: "good".into(), address: "2.2.2.2".into(), port: 90, tags: vec![], meta: Default::default() }),
                    entry: None,
                },
            ],
        };
        let response = coord.batch_update(request).await;
        assert_eq!(response.applied, 1);
        assert_eq!(response.skipped, 1);
    }

    #[tokio::test]
    async fn stale_agents_are_reaped() {
        let coord = coordinator();
        coord.register_agent(agent_info("a1"));
        let removed = coord.reap_stale_agents(chrono::Duration::seconds(-1));
        assert_eq!(removed, 1);
        assert_eq!(coord.agent_count(), 0);
    }
}
