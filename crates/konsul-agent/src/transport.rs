//! Transport adapter from an agent to its authority (spec §6 "Sync/API
//! wire protocol"). `AuthorityClient` is the seam the sync engine depends
//! on so it can be driven by a fake in tests.

use async_trait::async_trait;
use konsul_core::error::{Error, Result};
use konsul_protocol::{AgentInfo, BatchUpdateRequest, BatchUpdateResponse, HealthUpdate, SyncRequest, SyncResponse};

#[async_trait]
pub trait AuthorityClient: Send + Sync {
    async fn register(&self, info: AgentInfo) -> Result<()>;
    async fn sync(&self, request: SyncRequest) -> Result<SyncResponse>;
    async fn batch_update(&self, request: BatchUpdateRequest) -> Result<BatchUpdateResponse>;
    async fn health_update(&self, update: HealthUpdate) -> Result<()>;
}

pub struct HttpAuthorityClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAuthorityClient {
    pub fn new(server_address: &str, skip_verify: bool) -> Self {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(skip_verify)
            .build()
            .unwrap_or_default();
        Self { base_url: server_address.trim_end_matches('/').to_string(), client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl AuthorityClient for HttpAuthorityClient {
    async fn register(&self, info: AgentInfo) -> Result<()> {
        self.client
            .post(self.url("/v1/agent/register"))
            .json(&info)
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn sync(&self, request: SyncRequest) -> Result<SyncResponse> {
        let resp = self
            .client
            .post(self.url("/v1/agent/sync"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        resp.json().await.map_err(|e| Error::Unavailable(e.to_string()))
    }

    async fn batch_update(&self, request: BatchUpdateRequest) -> Result<BatchUpdateResponse> {
        let resp = self
            .client
            .post(self.url("/v1/agent/batch_update"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        resp.json().await.map_err(|e| Error::Unavailable(e.to_string()))
    }

    async fn health_update(&self, update: HealthUpdate) -> Result<()> {
        self.client
            .post(self.url("/v1/agent/health_update"))
            .json(&update)
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        Ok(())
    }
}
