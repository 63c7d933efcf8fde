//! Agent Sync Engine (C9, spec §4.9): a single cooperative task selecting
//! over a sync ticker, a full-sync ticker, and a pending local-update
//! queue.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use konsul_core::config::SyncConfig;
use konsul_protocol::{BatchUpdateRequest, ServiceUpdate, SyncRequest};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cache::AgentCache;
use crate::transport::AuthorityClient;

/// Shared with the agent runtime so `health()` can read sync freshness
/// and error rate without owning the engine.
#[derive(Default)]
pub struct SyncMetrics {
    last_sync_unix: AtomicI64,
    attempts: AtomicU64,
    errors: AtomicU64,
}

impl SyncMetrics {
    pub fn last_sync_unix(&self) -> i64 {
        self.last_sync_unix.load(Ordering::Relaxed)
    }

    pub fn error_rate(&self) -> f64 {
        let attempts = self.attempts.load(Ordering::Relaxed);
        if attempts == 0 {
            return 0.0;
        }
        self.errors.load(Ordering::Relaxed) as f64 / attempts as f64
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    fn record(&self, ok: bool) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.errors.fetch_add(1, Ordering::Relaxed);
        } else {
            self.last_sync_unix.store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
        }
    }
}

pub struct PendingQueue {
    tx: mpsc::Sender<ServiceUpdate>,
}

impl PendingQueue {
    /// Non-blocking enqueue; overflow is dropped with a warning (spec
    /// §4.9 "Pending-queue signal").
    pub fn push(&self, update: ServiceUpdate) {
        if self.tx.try_send(update).is_err() {
            tracing::warn!("pending update queue full, dropping update");
        }
    }
}

pub struct SyncEngine {
    agent_id: String,
    client: Arc<dyn AuthorityClient>,
    cache: Arc<AgentCache>,
    config: SyncConfig,
    watched_prefixes: Vec<String>,
    last_sync_index: AtomicI64,
    metrics: Arc<SyncMetrics>,
    queue_rx: mpsc::Receiver<ServiceUpdate>,
}

impl SyncEngine {
    pub fn new(
        agent_id: String,
        client: Arc<dyn AuthorityClient>,
        cache: Arc<AgentCache>,
        config: SyncConfig,
        watched_prefixes: Vec<String>,
    ) -> (Self, PendingQueue, Arc<SyncMetrics>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let metrics = Arc::new(SyncMetrics::default());
        let engine = Self {
            agent_id,
            client,
            cache,
            config,
            watched_prefixes,
            last_sync_index: AtomicI64::new(0),
            metrics: metrics.clone(),
            queue_rx: rx,
        };
        (engine, PendingQueue { tx }, metrics)
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut sync_ticker = tokio::time::interval(Duration::from_secs(self.config.interval_seconds.max(1)));
        let mut full_sync_ticker =
            tokio::time::interval(Duration::from_secs(self.config.full_sync_interval_seconds.max(1)));
        let mut batch: Vec<ServiceUpdate> = Vec::with_capacity(self.config.batch_size);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if !batch.is_empty() {
                        let _ = self.flush(&mut batch).await;
                    }
                    break;
                }
                _ = sync_ticker.tick() => {
                    self.pull(false).await;
                }
                _ = full_sync_ticker.tick() => {
                    self.pull(true).await;
                }
                Some(update) = self.queue_rx.recv() => {
                    batch.push(update);
                    if batch.len() >= self.config.batch_size {
                        let _ = self.flush(&mut batch).await;
                    }
                }
            }
        }
    }

    async fn pull(&self, full_sync: bool) {
        let last_index = self.last_sync_index.load(Ordering::Relaxed);
        let request = SyncRequest {
            agent_id: self.agent_id.clone(),
            last_sync_index: last_index,
            watched_prefixes: Some(self.watched_prefixes.clone()),
            full_sync,
        };
        match self.client.sync(request).await {
            Ok(response) => {
                for update in &response.service_updates {
                    self.cache.apply_service_update(update);
                }
                for update in &response.kv_updates {
                    self.cache.apply_kv_update(update);
                }
                self.last_sync_index.store(response.current_index, Ordering::Relaxed);
                self.metrics.record(true);
            }
            Err(err) => {
                tracing::warn!(error = %err, full_sync, "sync pull failed");
                self.metrics.record(false);
            }
        }
    }

    /// Flushes the batch buffer with retry, draining it regardless of
    /// outcome — a failed flush is reconciled by the next full sync
    /// rather than retried forever (spec §4.9).
    async fn flush(&self, batch: &mut Vec<ServiceUpdate>) -> bool {
        let updates = std::mem::take(batch);
        let request = BatchUpdateRequest { agent_id: self.agent_id.clone(), updates };
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.batch_update(request.clone()).await {
                Ok(response) => {
                    self.last_sync_index.store(response.current_index, Ordering::Relaxed);
                    return true;
                }
                Err(err) if attempt < self.config.retry_attempts => {
                    tracing::warn!(error = %err, attempt, "batch_update failed, retrying");
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
                Err(err) => {
                    tracing::error!(error = %err, attempts = attempt, "batch_update exhausted retries, updates lost from queue");
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use konsul_core::error::{Error, Result};
    use konsul_core::model::Service;
    use konsul_protocol::{AgentInfo, HealthUpdate, UpdateKind};

    use super::*;
    use crate::cache::AgentCache;

    /// Records every `batch_update`/`sync` call it receives; `sync` always
    /// answers with whatever `SyncResponse` was configured, `batch_update`
    /// fails `fail_remaining` times before it starts succeeding.
    #[derive(Default)]
    struct FakeAuthorityClient {
        batch_calls: Mutex<Vec<BatchUpdateRequest>>,
        sync_calls: Mutex<Vec<SyncRequest>>,
        fail_remaining: Mutex<usize>,
        sync_response: Mutex<Option<SyncResponse>>,
    }

    impl FakeAuthorityClient {
        fn failing(times: usize) -> Self {
            Self { fail_remaining: Mutex::new(times), ..Default::default() }
        }

        fn with_sync_response(response: SyncResponse) -> Self {
            Self { sync_response: Mutex::new(Some(response)), ..Default::default() }
        }

        fn batch_call_count(&self) -> usize {
            self.batch_calls.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl AuthorityClient for FakeAuthorityClient {
        async fn register(&self, _info: AgentInfo) -> Result<()> {
            Ok(())
        }

        async fn sync(&self, request: SyncRequest) -> Result<SyncResponse> {
            self.sync_calls.lock().unwrap().push(request);
            Ok(self.sync_response.lock().unwrap().clone().unwrap_or_default())
        }

        async fn batch_update(&self, request: BatchUpdateRequest) -> Result<BatchUpdateResponse> {
            self.batch_calls.lock().unwrap().push(request.clone());
            let mut remaining = self.fail_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Unavailable("fake batch_update failure".into()));
            }
            Ok(BatchUpdateResponse { applied: request.updates.len(), skipped: 0, current_index: 7 })
        }

        async fn health_update(&self, _update: HealthUpdate) -> Result<()> {
            Ok(())
        }
    }

    fn update(name: &str) -> ServiceUpdate {
        ServiceUpdate { kind: UpdateKind::Add, service_name: name.into(), service: None, entry: None }
    }

    fn engine(client: Arc<dyn AuthorityClient>) -> (SyncEngine, PendingQueue, Arc<SyncMetrics>) {
        let cache = Arc::new(AgentCache::new(10, Duration::from_secs(30), Duration::from_secs(30), Duration::from_secs(30)));
        SyncEngine::new("agent-1".into(), client, cache, SyncConfig::default(), vec![])
    }

    #[tokio::test]
    async fn flush_sends_exactly_one_batch_update_with_pending_updates() {
        let client = Arc::new(FakeAuthorityClient::default());
        let (engine, _pending, _metrics) = engine(client.clone());
        let mut batch = vec![update("web"), update("api")];

        let ok = engine.flush(&mut batch).await;

        assert!(ok);
        assert!(batch.is_empty());
        assert_eq!(client.batch_call_count(), 1);
        let sent = client.batch_calls.lock().unwrap();
        assert_eq!(sent[0].updates.len(), 2);
        assert_eq!(sent[0].agent_id, "agent-1");
    }

    #[tokio::test]
    async fn flush_retries_until_the_configured_attempt_limit_then_gives_up() {
        let client = Arc::new(FakeAuthorityClient::failing(10));
        let cache = Arc::new(AgentCache::new(10, Duration::from_secs(30), Duration::from_secs(30), Duration::from_secs(30)));
        let mut config = SyncConfig::default();
        config.retry_attempts = 3;
        config.retry_delay_ms = 1;
        let (engine, _pending, _metrics) =
            SyncEngine::new("agent-1".into(), client.clone() as Arc<dyn AuthorityClient>, cache, config, vec![]);
        let mut batch = vec![update("web")];

        let ok = engine.flush(&mut batch).await;

        assert!(!ok);
        assert!(batch.is_empty(), "batch is drained even when the flush ultimately fails");
        assert_eq!(client.batch_call_count(), 3);
    }

    #[tokio::test]
    async fn pull_applies_service_updates_to_the_cache() {
        let response = SyncResponse {
            current_index: 5,
            service_updates: vec![ServiceUpdate {
                kind: UpdateKind::Add,
                service_name: "web".into(),
                service: Some(Service { name: "web".into(), address: "10.0.0.1".into(), port: 80, tags: vec![], meta: Default::default() }),
                entry: None,
            }],
            kv_updates: vec![],
            health_updates: vec![],
        };
        let client = Arc::new(FakeAuthorityClient::with_sync_response(response));
        let cache = Arc::new(AgentCache::new(10, Duration::from_secs(30), Duration::from_secs(30), Duration::from_secs(30)));
        let (engine, _pending, metrics) =
            SyncEngine::new("agent-1".into(), client as Arc<dyn AuthorityClient>, cache.clone(), SyncConfig::default(), vec![]);

        engine.pull(false).await;

        assert!(cache.get_service("web").is_some());
        assert_eq!(engine.last_sync_index.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.attempts(), 1);
        assert_eq!(metrics.error_rate(), 0.0);
    }

    #[tokio::test]
    async fn pull_records_an_error_without_touching_last_sync_index() {
        struct AlwaysFails;
        #[async_trait::async_trait]
        impl AuthorityClient for AlwaysFails {
            async fn register(&self, _info: AgentInfo) -> Result<()> {
                Ok(())
            }
            async fn sync(&self, _request: SyncRequest) -> Result<SyncResponse> {
                Err(Error::Unavailable("down".into()))
            }
            async fn batch_update(&self, _request: BatchUpdateRequest) -> Result<BatchUpdateResponse> {
                Err(Error::Unavailable("down".into()))
            }
            async fn health_update(&self, _update: HealthUpdate) -> Result<()> {
                Ok(())
            }
        }
        let cache = Arc::new(AgentCache::new(10, Duration::from_secs(30), Duration::from_secs(30), Duration::from_secs(30)));
        let (engine, _pending, metrics) =
            SyncEngine::new("agent-1".into(), Arc::new(AlwaysFails), cache, SyncConfig::default(), vec![]);

        engine.pull(true).await;

        assert_eq!(engine.last_sync_index.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.attempts(), 1);
        assert_eq!(metrics.error_rate(), 1.0);
    }
}
