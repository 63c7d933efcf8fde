mod acl;
mod agent;
mod rate_limit;
mod replication;
mod server;
mod store;

pub use acl::*;
pub use agent::*;
pub use rate_limit::*;
pub use replication::*;
pub use server::*;
pub use store::*;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration for a Konsul authority process. Agent processes
/// load a standalone `AgentConfig` instead (see `config::AgentConfig`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub acl: AclConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
    /// Registry entries are pruned once unseen for this long.
    #[serde(default = "d_stale_agent_timeout")]
    pub stale_agent_timeout_seconds: i64,
}

fn d_stale_agent_timeout() -> i64 {
    120
}

impl Config {
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| crate::error::Error::InvalidArgument(format!("config: {e}")))
    }

    /// Validate cross-field invariants the type system can't express.
    /// Mirrors the grounding repo's `Config::validate` pattern: collect
    /// issues rather than failing fast, so `konsul config validate` can
    /// report everything at once.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.store.sweep_interval_seconds == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "store.sweep_interval_seconds must be > 0".into(),
            });
        }
        if self.rate_limit.enabled && self.rate_limit.default_burst == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "rate_limit.default_burst is 0 — every request will be denied".into(),
            });
        }
        if self.rate_limit.enabled && self.rate_limit.default_rate_per_second <= 0.0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "rate_limit.default_rate_per_second must be > 0 when enabled".into(),
            });
        }
        if self.stale_agent_timeout_seconds <= 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "stale_agent_timeout_seconds must be > 0".into(),
            });
        }
        if self.acl.enabled && self.acl.default_policies.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "acl.enabled is true but default_policies is empty — \
                          unauthenticated requests will be denied by default"
                    .into(),
            });
        }

        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_errors() {
        let cfg = Config::default();
        let issues = cfg.validate();
        assert!(!issues.iter().any(|i| i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn zero_sweep_interval_is_an_error() {
        let mut cfg = Config::default();
        cfg.store.sweep_interval_seconds = 0;
        let issues = cfg.validate();
        assert!(issues.iter().any(|i| i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn rate_limit_enabled_with_zero_burst_warns() {
        let mut cfg = Config::default();
        cfg.rate_limit.enabled = true;
        cfg.rate_limit.default_burst = 0;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Warning && i.message.contains("burst")));
    }
}
