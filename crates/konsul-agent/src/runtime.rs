//! Agent Runtime (C10, spec §4.10): owns configuration, wires C4/C5/C8/C9
//! and the transport adapter, and exposes the agent-local API surface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use konsul_core::config::AgentConfig;
use konsul_core::error::{Error, Result};
use konsul_core::model::Service;
use konsul_health::{HealthManager, NullHealthSink};
use konsul_protocol::{AgentInfo, ServiceUpdate, UpdateKind};
use konsul_watch::WatchManager;
use parking_lot::RwLock;
use rand::RngCore;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cache::{AgentCache, CacheStats};
use crate::sync::{PendingQueue, SyncEngine, SyncMetrics};
use crate::transport::{AuthorityClient, HttpAuthorityClient};

struct LocalRegistration {
    service: Service,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AgentHealth {
    pub healthy: bool,
    pub reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AgentStats {
    pub agent_id: String,
    pub uptime_seconds: i64,
    pub cache: CacheStats,
    pub sync_attempts: u64,
    pub sync_error_rate: f64,
    pub local_registrations: usize,
}

pub struct AgentRuntime {
    pub agent_id: String,
    config: AgentConfig,
    started_at: DateTime<Utc>,
    cache: Arc<AgentCache>,
    health_manager: Arc<HealthManager>,
    watch_manager: Arc<WatchManager>,
    pending: PendingQueue,
    sync_metrics: Arc<SyncMetrics>,
    cancel: CancellationToken,
    local_services: RwLock<HashMap<String, LocalRegistration>>,
}

impl AgentRuntime {
    /// Builds the runtime and spawns its background sync task. The
    /// returned `CancellationToken` can be used by the caller to shut the
    /// agent down; the sync engine drains its batch buffer once on
    /// cancellation (spec §4.9 "Shutdown").
    pub fn start(config: AgentConfig) -> (Arc<Self>, CancellationToken) {
        let agent_id = assign_agent_id(&config);
        let cache = Arc::new(AgentCache::new(
            config.cache.max_entries,
            Duration::from_secs(config.cache.service_ttl_seconds),
            Duration::from_secs(config.cache.kv_ttl_seconds),
            Duration::from_secs(config.cache.health_ttl_seconds),
        ));
        let health_manager = Arc::new(HealthManager::new(Arc::new(NullHealthSink)));
        let watch_manager = Arc::new(WatchManager::new(128));
        let client: Arc<dyn AuthorityClient> =
            Arc::new(HttpAuthorityClient::new(&config.server_address, config.tls.skip_verify));

        let (engine, pending, sync_metrics) = SyncEngine::new(
            agent_id.clone(),
            client,
            cache.clone(),
            config.sync.clone(),
            config.watched_prefixes.clone(),
        );
        let cancel = CancellationToken::new();
        tokio::spawn(engine.run(cancel.clone()));

        let runtime = Arc::new(Self {
            agent_id,
            config,
            started_at: Utc::now(),
            cache,
            health_manager,
            watch_manager,
            pending,
            sync_metrics,
            cancel: cancel.clone(),
            local_services: RwLock::new(HashMap::new()),
        });
        (runtime, cancel)
    }

    pub fn cache(&self) -> &Arc<AgentCache> {
        &self.cache
    }

    pub fn health_manager(&self) -> &Arc<HealthManager> {
        &self.health_manager
    }

    pub fn watch_manager(&self) -> &Arc<WatchManager> {
        &self.watch_manager
    }

    pub fn bind_address(&self) -> &str {
        &self.config.bind_address
    }

    pub fn agent_info(&self) -> AgentInfo {
        AgentInfo {
            id: self.agent_id.clone(),
            node_name: self.config.node_name.clone(),
            node_ip: self.config.node_ip.clone(),
            datacenter: self.config.datacenter.clone(),
            metadata: self.config.metadata.clone(),
            started_at: self.started_at,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// `register_service(local)`: validate, assign a stable id, write
    /// through to the local table, and enqueue the update for C9.
    pub fn register_service(&self, service: Service) -> Result<String> {
        if service.name.is_empty() || service.address.is_empty() || service.port == 0 {
            return Err(Error::InvalidArgument("service name/address/port must be set".into()));
        }
        let service_id = format!("{}:{}:{}", self.config.node_name, service.name, service.port);
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(self.config.cache.service_ttl_seconds as i64);
        self.local_services
            .write()
            .insert(service_id.clone(), LocalRegistration { service: service.clone(), expires_at });
        self.cache.set_service(service.clone());
        self.pending.push(ServiceUpdate {
            kind: UpdateKind::Add,
            service_name: service.name.clone(),
            service: Some(service),
            entry: None,
        });
        Ok(service_id)
    }

    pub fn deregister_service(&self, service_id: &str) {
        if let Some(reg) = self.local_services.write().remove(service_id) {
            self.pending.push(ServiceUpdate {
                kind: UpdateKind::Delete,
                service_name: reg.service.name.clone(),
                service: Some(reg.service),
                entry: None,
            });
        }
    }

    /// `health()`: cancellation not requested, sync is fresh or has never
    /// run, and the error rate is below 50%.
    pub fn health(&self) -> AgentHealth {
        if self.cancel.is_cancelled() {
            return AgentHealth { healthy: false, reason: "shutting down" };
        }
        let last_sync = self.sync_metrics.last_sync_unix();
        let fresh = last_sync == 0
            || (Utc::now().timestamp() - last_sync) < (2 * self.config.sync.interval_seconds as i64);
        if !fresh {
            return AgentHealth { healthy: false, reason: "sync stale" };
        }
        if self.sync_metrics.error_rate() >= 0.5 && self.sync_metrics.attempts() > 0 {
            return AgentHealth { healthy: false, reason: "sync error rate too high" };
        }
        AgentHealth { healthy: true, reason: "ok" }
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            agent_id: self.agent_id.clone(),
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
            cache: self.cache.stats(),
            sync_attempts: self.sync_metrics.attempts(),
            sync_error_rate: self.sync_metrics.error_rate(),
            local_registrations: self.local_services.read().len(),
        }
    }
}

/// If configuration supplies none or the sentinel value, generate
/// `agent-<node-or-hostname>-<8-byte-random-hex>` (spec §4.10).
fn assign_agent_id(config: &AgentConfig) -> String {
    match &config.id {
        Some(id) if !id.is_empty() && id != "auto" => id.clone(),
        _ => {
            let mut bytes = [0u8; 8];
            rand::thread_rng().fill_bytes(&mut bytes);
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            format!("agent-{}-{}", config.node_name, hex)
        }
    }
}
