//! Decouples the stores (C2/C3) from the watch manager (C5): a store holds
//! an `Arc<dyn WatchSink>` and calls `publish` synchronously while still
//! holding its writer lock, satisfying spec §4.2's "publish before
//! releasing the writer lock" ordering guarantee without the store crate
//! depending on the watch crate. `publish` itself must never block on
//! network I/O or another component's lock — it should only enqueue.

use crate::model::WatchEvent;

pub trait WatchSink: Send + Sync {
    fn publish(&self, event: WatchEvent);
}

/// A sink that drops every event. Used by tests and by standalone stores
/// that aren't wired to a watch manager.
pub struct NullSink;

impl WatchSink for NullSink {
    fn publish(&self, _event: WatchEvent) {}
}
