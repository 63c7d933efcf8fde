//! In-memory KV store (C2) and service store (C3): the canonical data
//! structures of a Konsul authority, plus the bounded change log they
//! both use for delta sync.

pub mod changelog;
pub mod kv;
pub mod service;

pub use changelog::ChangeLog;
pub use kv::{KVStore, CAS_CREATE_ONLY};
pub use service::ServiceStore;
