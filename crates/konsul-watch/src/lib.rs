//! Watch Manager (C5): pattern-indexed pub/sub with bounded per-watcher
//! channels and drop-not-block backpressure.

pub mod manager;

pub use manager::{WatchManager, Watcher};
