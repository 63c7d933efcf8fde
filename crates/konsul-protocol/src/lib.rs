//! Sync/API wire protocol (spec §6).
//!
//! These are the JSON payloads carried by the HTTP transport between an
//! agent and the authority. The transport itself (routing, framing) is an
//! external collaborator; this crate only fixes the message shapes so both
//! sides agree on them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use konsul_core::model::{HealthCheck, KVEntry, Service, ServiceEntry};
use serde::{Deserialize, Serialize};

/// `agent.register` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub node_name: String,
    pub node_ip: Option<String>,
    #[serde(default)]
    pub datacenter: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub version: String,
}

/// `type` discriminant shared by `ServiceUpdate`/`KVUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUpdate {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    pub service_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<ServiceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KVUpdate {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<KVEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatusWire {
    Passing,
    Warning,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthUpdate {
    pub service_id: String,
    pub check_id: String,
    pub status: HealthStatusWire,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<HealthCheck>,
}

/// `agent.sync` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub agent_id: String,
    pub last_sync_index: i64,
    #[serde(default)]
    pub watched_prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub full_sync: bool,
}

/// `agent.sync` response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncResponse {
    pub current_index: i64,
    #[serde(default)]
    pub service_updates: Vec<ServiceUpdate>,
    #[serde(default)]
    pub kv_updates: Vec<KVUpdate>,
    #[serde(default)]
    pub health_updates: Vec<HealthUpdate>,
}

/// `agent.batch_update` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpdateRequest {
    pub agent_id: String,
    pub updates: Vec<ServiceUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BatchUpdateResponse {
    pub applied: usize,
    pub skipped: usize,
    pub current_index: i64,
}

/// Watch stream event, transport-neutral (spec §6 "Watch stream").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchStreamEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub timestamp: i64,
    /// Set when the watcher has previously dropped events and this is the
    /// first delivery since — instructs the client to re-issue a full read
    /// (see SPEC_FULL.md supplement 1 / spec §9).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub resync_required: bool,
}

/// CAS write envelope carried over the wire (spec §6 "CAS semantics across
/// the wire"). `cas == Some(0)` means create-only; `cas == Some(n)` with
/// `n != 0` means "succeed only if current modify_index == n"; `cas ==
/// None` means an unconditional write.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CasWrite {
    #[serde(default)]
    pub cas: Option<u64>,
}

/// Replicated command tags (spec §4.11, enumerated so they're stable for
/// forward compatibility across an eventual disk/Raft-log backed adapter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandTag {
    KvSet,
    KvSetWithFlags,
    KvSetCas,
    KvDelete,
    KvDeleteCas,
    KvBatchSet,
    KvBatchDelete,
    KvBatchSetCas,
    KvBatchDeleteCas,
    ServiceRegister,
    ServiceRegisterCas,
    ServiceDeregister,
    ServiceDeregisterCas,
    ServiceHeartbeat,
    HealthTtlUpdate,
}

/// A tagged, self-describing replication command (spec §6 "Persisted state
/// layout"): `{type: <command-tag>, payload: <type-specific JSON>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub tag: CommandTag,
    pub payload: serde_json::Value,
}
