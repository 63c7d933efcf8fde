use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Policy names applied when a request carries no explicit policy set
    /// (e.g. anonymous / default token).
    #[serde(default)]
    pub default_policies: Vec<String>,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self { enabled: false, default_policies: Vec::new() }
    }
}
