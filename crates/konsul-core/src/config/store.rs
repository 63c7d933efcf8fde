use serde::{Deserialize, Serialize};

/// Tunables for the service store's validation limits and expiry sweeper
/// (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "d_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "d_max_tags")]
    pub max_tags: usize,
    #[serde(default = "d_max_tag_len")]
    pub max_tag_len: usize,
    #[serde(default = "d_max_meta_entries")]
    pub max_meta_entries: usize,
    #[serde(default = "d_max_meta_len")]
    pub max_meta_len: usize,
    #[serde(default = "d_default_service_ttl")]
    pub default_service_ttl_seconds: u64,
    /// Bound on the in-memory change log used for delta sync (see
    /// SPEC_FULL.md Open Question 1).
    #[serde(default = "d_change_log_capacity")]
    pub change_log_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: d_sweep_interval(),
            max_tags: d_max_tags(),
            max_tag_len: d_max_tag_len(),
            max_meta_entries: d_max_meta_entries(),
            max_meta_len: d_max_meta_len(),
            default_service_ttl_seconds: d_default_service_ttl(),
            change_log_capacity: d_change_log_capacity(),
        }
    }
}

fn d_sweep_interval() -> u64 {
    5
}
fn d_max_tags() -> usize {
    64
}
fn d_max_tag_len() -> usize {
    255
}
fn d_max_meta_entries() -> usize {
    64
}
fn d_max_meta_len() -> usize {
    255
}
fn d_default_service_ttl() -> u64 {
    30
}
fn d_change_log_capacity() -> usize {
    4096
}
