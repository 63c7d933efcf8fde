//! Health Check Manager (C4, spec §4.4): owns check lifecycle, spawns a
//! per-check ticker for active probe types, and lazily transitions TTL
//! checks on read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use konsul_core::error::{Error, Result};
use konsul_core::model::{CheckDefinition, CheckStatus, HealthCheck};
use konsul_protocol::{HealthStatusWire, HealthUpdate};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::probes;
use crate::sink::HealthSink;

struct Ticker {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

pub struct HealthManager {
    checks: RwLock<HashMap<String, Arc<Mutex<HealthCheck>>>>,
    tickers: Mutex<HashMap<String, Ticker>>,
    sink: Arc<dyn HealthSink>,
    client: reqwest::Client,
    last_seen: Mutex<HashMap<String, CheckStatus>>,
}

impl HealthManager {
    pub fn new(sink: Arc<dyn HealthSink>) -> Self {
        Self {
            checks: RwLock::new(HashMap::new()),
            tickers: Mutex::new(HashMap::new()),
            sink,
            client: reqwest::Client::new(),
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_check(
        &self,
        id: String,
        service_id: String,
        definition: CheckDefinition,
        interval_seconds: u64,
        timeout_seconds: u64,
    ) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidArgument("check id must not be empty".into()));
        }
        let now = Utc::now();
        let check = HealthCheck::new(
            id.clone(),
            service_id.clone(),
            definition.clone(),
            interval_seconds,
            timeout_seconds,
            now,
        );
        let state = Arc::new(Mutex::new(check));
        {
            let mut checks = self.checks.write();
            if let Some(existing) = checks.remove(&id) {
                drop(existing);
                self.stop_ticker(&id);
            }
            checks.insert(id.clone(), state.clone());
        }
        if !matches!(definition, CheckDefinition::Ttl { .. }) {
            self.spawn_ticker(id, definition, interval_seconds, timeout_seconds, state);
        }
        Ok(())
    }

    pub fn remove_check(&self, id: &str) {
        self.checks.write().remove(id);
        self.stop_ticker(id);
        self.last_seen.lock().remove(id);
    }

    pub fn get(&self, id: &str) -> Option<HealthCheck> {
        let checks = self.checks.read();
        let state = checks.get(id)?;
        let mut check = state.lock();
        self.lazily_expire_ttl(&mut check);
        Some(check.clone())
    }

    pub fn list(&self) -> Vec<HealthCheck> {
        let checks = self.checks.read();
        checks
            .values()
            .map(|state| {
                let mut check = state.lock();
                self.lazily_expire_ttl(&mut check);
                check.clone()
            })
            .collect()
    }

    /// `update_ttl(id)`: sets `passing` and extends `expires_at`. Only
    /// valid for TTL-defined checks.
    pub fn update_ttl(&self, id: &str) -> Result<()> {
        let checks = self.checks.read();
        let state = checks.get(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        let mut check = state.lock();
        let ttl_seconds = match &check.definition {
            CheckDefinition::Ttl { ttl_seconds } => *ttl_seconds,
            _ => return Err(Error::InvalidArgument(format!("check {id} is not a TTL check"))),
        };
        let now = Utc::now();
        check.status = CheckStatus::Passing;
        check.output.clear();
        check.last_check = now;
        check.expires_at = Some(now + chrono::Duration::seconds(ttl_seconds as i64));
        Ok(())
    }

    /// Runs once per `check_interval`: diffs status against the last
    /// observed snapshot and reports only changed checks to the sink.
    pub fn report_changes(&self) {
        let current = self.list();
        let mut last_seen = self.last_seen.lock();
        for check in current {
            let changed = last_seen.get(&check.id).map(|s| *s != check.status).unwrap_or(true);
            if changed {
                last_seen.insert(check.id.clone(), check.status);
                self.sink.report(HealthUpdate {
                    service_id: check.service_id.clone(),
                    check_id: check.id.clone(),
                    status: wire_status(check.status),
                    output: Some(check.output.clone()),
                    check: Some(check),
                });
            }
        }
    }

    fn lazily_expire_ttl(&self, check: &mut HealthCheck) {
        if let Some(expires_at) = check.expires_at {
            if check.status != CheckStatus::Critical && expires_at < Utc::now() {
                check.status = CheckStatus::Critical;
                check.output = "TTL expired".to_string();
            }
        }
    }

    fn stop_ticker(&self, id: &str) {
        if let Some(ticker) = self.tickers.lock().remove(id) {
            ticker.cancel.cancel();
            ticker.handle.abort();
        }
    }

    fn spawn_ticker(
        &self,
        id: String,
        definition: CheckDefinition,
        interval_seconds: u64,
        timeout_seconds: u64,
        state: Arc<Mutex<HealthCheck>>,
    ) {
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let client = self.client.clone();
        let interval = Duration::from_secs(interval_seconds.max(1));
        let timeout = Duration::from_secs(timeout_seconds.max(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        let outcome = match &definition {
                            CheckDefinition::Http { url, method, headers, .. } => {
                                probes::probe_http(&client, url, method, headers, timeout).await
                            }
                            CheckDefinition::Tcp { address } => probes::probe_tcp(address, timeout).await,
                            CheckDefinition::Grpc { target, tls } => probes::probe_grpc(target, *tls, timeout).await,
                            CheckDefinition::Ttl { .. } => continue,
                        };
                        let mut check = state.lock();
                        check.status = outcome.status;
                        check.output = outcome.output;
                        check.last_check = Utc::now();
                    }
                }
            }
        });
        self.tickers.lock().insert(id, Ticker { cancel, handle });
    }
}

impl Drop for HealthManager {
    fn drop(&mut self) {
        for (_, ticker) in self.tickers.lock().drain() {
            ticker.cancel.cancel();
            ticker.handle.abort();
        }
    }
}

fn wire_status(status: CheckStatus) -> HealthStatusWire {
    match status {
        CheckStatus::Passing => HealthStatusWire::Passing,
        CheckStatus::Warning => HealthStatusWire::Warning,
        CheckStatus::Critical => HealthStatusWire::Critical,
        CheckStatus::Unknown => HealthStatusWire::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullHealthSink;

    fn manager() -> HealthManager {
        HealthManager::new(Arc::new(NullHealthSink))
    }

    #[test]
    fn ttl_check_starts_critical() {
        let m = manager();
        m.add_check("c1".into(), "svc".into(), CheckDefinition::Ttl { ttl_seconds: 10 }, 10, 5).unwrap();
        assert_eq!(m.get("c1").unwrap().status, CheckStatus::Critical);
    }

    #[test]
    fn update_ttl_marks_passing() {
        let m = manager();
        m.add_check("c1".into(), "svc".into(), CheckDefinition::Ttl { ttl_seconds: 10 }, 10, 5).unwrap();
        m.update_ttl("c1").unwrap();
        assert_eq!(m.get("c1").unwrap().status, CheckStatus::Passing);
    }

    #[test]
    fn update_ttl_on_non_ttl_check_is_invalid() {
        let m = manager();
        m.add_check(
            "c1".into(),
            "svc".into(),
            CheckDefinition::Tcp { address: "127.0.0.1:1".into() },
            3600,
            5,
        )
        .unwrap();
        assert!(matches!(m.update_ttl("c1"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn expired_ttl_reads_as_critical_lazily() {
        let m = manager();
        m.add_check("c1".into(), "svc".into(), CheckDefinition::Ttl { ttl_seconds: 0 }, 10, 5).unwrap();
        m.update_ttl("c1").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let check = m.get("c1").unwrap();
        assert_eq!(check.status, CheckStatus::Critical);
        assert_eq!(check.output, "TTL expired");
    }

    #[test]
    fn remove_check_drops_it_from_list() {
        let m = manager();
        m.add_check("c1".into(), "svc".into(), CheckDefinition::Ttl { ttl_seconds: 10 }, 10, 5).unwrap();
        m.remove_check("c1");
        assert!(m.get("c1").is_none());
        assert!(m.list().is_empty());
    }

    #[test]
    fn report_changes_emits_only_on_transition() {
        let m = manager();
        m.add_check("c1".into(), "svc".into(), CheckDefinition::Ttl { ttl_seconds: 10 }, 10, 5).unwrap();
        m.report_changes();
        m.report_changes();
    }
}
