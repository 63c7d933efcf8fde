use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The agent's full configuration surface (spec §6 "Configuration surface").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Sentinel meaning "generate one" (see C10 agent-id assignment rule).
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "d_node_name")]
    pub node_name: String,
    #[serde(default)]
    pub node_ip: Option<String>,
    #[serde(default)]
    pub datacenter: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub server_address: String,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default = "d_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub health_checks: HealthChecksConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub watched_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ca_cert: Option<String>,
    #[serde(default)]
    pub client_cert: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub skip_verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "d_service_ttl")]
    pub service_ttl_seconds: u64,
    #[serde(default = "d_kv_ttl")]
    pub kv_ttl_seconds: u64,
    #[serde(default = "d_health_ttl")]
    pub health_ttl_seconds: u64,
    #[serde(default = "d_max_entries")]
    pub max_entries: usize,
    #[serde(default = "d_eviction_policy")]
    pub eviction_policy: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            service_ttl_seconds: d_service_ttl(),
            kv_ttl_seconds: d_kv_ttl(),
            health_ttl_seconds: d_health_ttl(),
            max_entries: d_max_entries(),
            eviction_policy: d_eviction_policy(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthChecksConfig {
    #[serde(default)]
    pub enable_local_execution: bool,
    #[serde(default = "d_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default)]
    pub report_only_changes: bool,
    #[serde(default = "d_check_timeout")]
    pub timeout_seconds: u64,
}

impl Default for HealthChecksConfig {
    fn default() -> Self {
        Self {
            enable_local_execution: true,
            check_interval_seconds: d_check_interval(),
            report_only_changes: true,
            timeout_seconds: d_check_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "d_sync_interval")]
    pub interval_seconds: u64,
    #[serde(default = "d_full_sync_interval")]
    pub full_sync_interval_seconds: u64,
    #[serde(default = "d_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub compression: bool,
    #[serde(default = "d_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "d_retry_delay")]
    pub retry_delay_ms: u64,
    #[serde(default = "d_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_seconds: d_sync_interval(),
            full_sync_interval_seconds: d_full_sync_interval(),
            batch_size: d_batch_size(),
            compression: false,
            retry_attempts: d_retry_attempts(),
            retry_delay_ms: d_retry_delay(),
            queue_capacity: d_queue_capacity(),
        }
    }
}

fn d_node_name() -> String {
    "konsul-agent".into()
}
fn d_bind_address() -> String {
    "127.0.0.1:8600".into()
}
fn d_service_ttl() -> u64 {
    30
}
fn d_kv_ttl() -> u64 {
    10
}
fn d_health_ttl() -> u64 {
    15
}
fn d_max_entries() -> usize {
    10_000
}
fn d_eviction_policy() -> String {
    "lru".into()
}
fn d_check_interval() -> u64 {
    10
}
fn d_check_timeout() -> u64 {
    5
}
fn d_sync_interval() -> u64 {
    10
}
fn d_full_sync_interval() -> u64 {
    300
}
fn d_batch_size() -> usize {
    100
}
fn d_retry_attempts() -> u32 {
    3
}
fn d_retry_delay() -> u64 {
    500
}
fn d_queue_capacity() -> usize {
    1000
}
