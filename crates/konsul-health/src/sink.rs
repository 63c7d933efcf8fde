//! Mirrors `konsul_core::sink::WatchSink`'s decoupling trick for the health
//! manager's change-reporting path (spec §4.4 "Change reporting").

use konsul_protocol::HealthUpdate;

pub trait HealthSink: Send + Sync {
    fn report(&self, update: HealthUpdate);
}

pub struct NullHealthSink;

impl HealthSink for NullHealthSink {
    fn report(&self, _update: HealthUpdate) {}
}
