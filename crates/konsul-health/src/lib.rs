//! Health Check Manager (C4): active HTTP/TCP/gRPC probes plus lazily
//! expiring TTL checks.

pub mod manager;
pub mod probes;
pub mod sink;

pub use manager::HealthManager;
pub use sink::{HealthSink, NullHealthSink};
