use serde::{Deserialize, Serialize};

/// Whether the coordinator routes writes through a replication adapter
/// (C12) or applies them directly to the in-memory stores.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplicationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_timeout")]
    pub apply_timeout_ms: u64,
}

fn d_timeout() -> u64 {
    5_000
}
