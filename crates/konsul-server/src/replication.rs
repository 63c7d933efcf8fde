//! Replication Adapter (C12, spec §4.11 "Replication hook"): pluggable
//! interface for a leader-only write path. This crate ships only the
//! interface and a logging default — a real consensus backend is outside
//! this component's scope.

use std::time::Duration;

use async_trait::async_trait;
use konsul_core::error::Result;
use konsul_protocol::Command;

#[async_trait]
pub trait ReplicationAdapter: Send + Sync {
    /// Submits `command` to the replication log. Returns
    /// `Err(Error::NotLeader { .. })` when this node cannot accept writes.
    async fn apply(&self, command: Command, timeout: Duration) -> Result<()>;
}

/// Accepts every command immediately and only logs it. Used when
/// replication is "configured" without a real consensus backend wired in
/// (spec §9 Open Question: persisted state layout is left opaque to this
/// component; see DESIGN.md).
pub struct LoggingReplicationAdapter;

#[async_trait]
impl ReplicationAdapter for LoggingReplicationAdapter {
    async fn apply(&self, command: Command, _timeout: Duration) -> Result<()> {
        tracing::debug!(tag = ?command.tag, "replication: command accepted");
        Ok(())
    }
}
