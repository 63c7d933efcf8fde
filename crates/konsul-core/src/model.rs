//! Core data model (spec §3): `Service`/`ServiceEntry`, `KVEntry`,
//! `HealthCheck`, `Policy`, `WatchEvent`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Immutable-per-register service record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

/// `Service` plus store-owned bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub service: Service,
    pub expires_at: DateTime<Utc>,
    pub create_index: u64,
    pub modify_index: u64,
}

impl ServiceEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// KV
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single KV value owned by the KV store, keyed by a hierarchical
/// slash-delimited path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KVEntry {
    pub value: Vec<u8>,
    #[serde(default)]
    pub flags: u64,
    pub create_index: u64,
    pub modify_index: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Health checks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passing,
    Warning,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckDefinition {
    Http {
        url: String,
        #[serde(default = "default_http_method")]
        method: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        tls_skip_verify: bool,
    },
    Tcp {
        address: String,
    },
    Grpc {
        target: String,
        #[serde(default)]
        tls: bool,
    },
    Ttl {
        ttl_seconds: u64,
    },
}

fn default_http_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub id: String,
    pub service_id: String,
    pub definition: CheckDefinition,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub status: CheckStatus,
    #[serde(default)]
    pub output: String,
    pub last_check: DateTime<Utc>,
    /// Only meaningful for `CheckDefinition::Ttl`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl HealthCheck {
    pub fn new(id: String, service_id: String, definition: CheckDefinition, interval_seconds: u64, timeout_seconds: u64, now: DateTime<Utc>) -> Self {
        let expires_at = match &definition {
            CheckDefinition::Ttl { ttl_seconds } => Some(now + chrono::Duration::seconds(*ttl_seconds as i64)),
            _ => None,
        };
        Self {
            id,
            service_id,
            definition,
            interval_seconds,
            timeout_seconds,
            status: CheckStatus::Critical,
            output: String::new(),
            last_check: now,
            expires_at,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ACL policies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Read,
    Write,
    Create,
    Update,
    Delete,
    List,
    Sudo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Kv,
    Service,
    Health,
    Backup,
    Admin,
}

/// A single ACL rule: a resource class, a glob pattern over the resource's
/// selector (KV path / service name; ignored for class-scoped resources),
/// and the set of capabilities it grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub class: ResourceClass,
    #[serde(default)]
    pub pattern: Option<String>,
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub rules: Vec<Rule>,
}

/// A concrete resource being checked against a policy set.
#[derive(Debug, Clone)]
pub struct Resource<'a> {
    pub class: ResourceClass,
    /// KV path or service name; `None` for class-scoped resources
    /// (health/backup/admin).
    pub selector: Option<&'a str>,
}

impl<'a> Resource<'a> {
    pub fn kv(path: &'a str) -> Self {
        Self { class: ResourceClass::Kv, selector: Some(path) }
    }
    pub fn service(name: &'a str) -> Self {
        Self { class: ResourceClass::Service, selector: Some(name) }
    }
    pub fn class_scoped(class: ResourceClass) -> Self {
        Self { class, selector: None }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Watch events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchEventType {
    Set,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub event_type: WatchEventType,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Vec<u8>>,
    pub timestamp: i64,
}

impl WatchEvent {
    pub fn set(key: impl Into<String>, value: Vec<u8>, now: DateTime<Utc>) -> Self {
        Self {
            event_type: WatchEventType::Set,
            key: key.into(),
            value: Some(value),
            timestamp: now.timestamp(),
        }
    }

    pub fn delete(key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            event_type: WatchEventType::Delete,
            key: key.into(),
            value: None,
            timestamp: now.timestamp(),
        }
    }
}
