//! `AppState` construction and background-task spawning extracted from
//! the CLI's `serve` command.

use std::sync::Arc;
use std::time::Duration;

use konsul_acl::AclEvaluator;
use konsul_core::config::{Config, ConfigSeverity};
use konsul_core::index::IndexCounter;
use konsul_health::{HealthManager, NullHealthSink};
use konsul_ratelimit::RateLimiter;
use konsul_store::{KVStore, ServiceStore};
use konsul_watch::WatchManager;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;

use crate::coordinator::ServerCoordinator;
use crate::replication::{LoggingReplicationAdapter, ReplicationAdapter};
use crate::state::AppState;

/// Validate config, wire every subsystem together and return a fully
/// built [`AppState`]. Shared by `serve` and `config validate`-adjacent
/// startup paths.
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let index = Arc::new(IndexCounter::new());
    let watch_manager = Arc::new(WatchManager::new(128));

    let kv = Arc::new(KVStore::new(index.clone(), watch_manager.clone(), config.store.change_log_capacity));
    let services = Arc::new(ServiceStore::new(index.clone(), watch_manager.clone(), config.store.clone()));
    tracing::info!("KV store and service store ready");

    let acl = Arc::new(AclEvaluator::new(config.acl.enabled));
    if config.acl.enabled {
        tracing::info!(default_policies = config.acl.default_policies.len(), "ACL enforcement enabled");
    } else {
        tracing::warn!("ACL enforcement disabled — every request is implicitly authorized");
    }

    let rate_limiter =
        Arc::new(RateLimiter::new(config.rate_limit.default_rate_per_second, config.rate_limit.default_burst as f64));

    let health_manager = Arc::new(HealthManager::new(Arc::new(NullHealthSink)));

    let replication: Option<Arc<dyn ReplicationAdapter>> =
        if config.replication.enabled { Some(Arc::new(LoggingReplicationAdapter)) } else { None };
    let replication_timeout = Duration::from_millis(config.replication.apply_timeout_ms);

    let coordinator = Arc::new(ServerCoordinator::new(
        kv,
        services,
        index,
        replication,
        replication_timeout,
        config.store.default_service_ttl_seconds,
    ));

    let admin_token = std::env::var(&config.server.admin_token_env).ok().filter(|t| !t.is_empty());
    match &admin_token {
        Some(_) => tracing::info!(env = %config.server.admin_token_env, "admin bearer-token auth enabled"),
        None => tracing::warn!(
            env = %config.server.admin_token_env,
            "admin bearer-token auth DISABLED — admin endpoints run unauthenticated"
        ),
    }

    Ok(AppState { coordinator, watch_manager, acl, rate_limiter, health_manager, config, admin_token })
}

/// Spawn the long-running background tasks: service expiry sweep, stale
/// agent reaping, and rate-limiter bucket cleanup. Call after
/// [`build_app_state`] when running the HTTP server; one-shot CLI
/// commands skip this.
pub fn spawn_background_tasks(state: &AppState) {
    {
        let services = state.coordinator.services().clone();
        let interval_secs = state.config.store.sweep_interval_seconds.max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                let removed = services.sweep_expired(chrono::Utc::now());
                if removed > 0 {
                    tracing::debug!(removed, "expiry sweep ran");
                }
            }
        });
    }

    {
        let coordinator = state.coordinator.clone();
        let stale_timeout = chrono::Duration::seconds(state.config.stale_agent_timeout_seconds);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let removed = coordinator.reap_stale_agents(stale_timeout);
                if removed > 0 {
                    tracing::info!(removed, "reaped stale agents");
                }
            }
        });
    }

    if state.config.rate_limit.enabled {
        let rate_limiter = state.rate_limiter.clone();
        let cleanup_interval = Duration::from_secs(state.config.rate_limit.cleanup_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);
            loop {
                interval.tick().await;
                rate_limiter.cleanup(cleanup_interval);
            }
        });
    }

    tracing::info!("background tasks spawned");
}

/// Wraps per-IP `tower_governor` rate limiting around the router when
/// `server.rate_limit` is configured (spec §4.7 "distinct from the HTTP
/// layer per-IP limiter").
pub fn with_http_rate_limit(router: axum::Router, config: &Config) -> axum::Router {
    let Some(http_limit) = &config.server.rate_limit else { return router };
    let governor_conf = match GovernorConfigBuilder::default()
        .per_second(http_limit.requests_per_second)
        .burst_size(http_limit.burst_size)
        .finish()
    {
        Some(conf) => conf,
        None => {
            tracing::warn!("invalid server.rate_limit configuration, skipping HTTP-layer limiter");
            return router;
        }
    };
    tracing::info!(
        requests_per_second = http_limit.requests_per_second,
        burst_size = http_limit.burst_size,
        "per-IP rate limiting enabled"
    );
    router.layer(GovernorLayer { config: Arc::new(governor_conf) })
}
