//! Agent-side components: bounded TTL caches (C8), the cooperative sync
//! engine (C9), and the runtime that wires them together (C10).

pub mod cache;
pub mod http;
pub mod runtime;
pub mod sync;
pub mod transport;

pub use cache::AgentCache;
pub use runtime::{AgentHealth, AgentRuntime, AgentStats};
pub use sync::{PendingQueue, SyncEngine, SyncMetrics};
pub use transport::{AuthorityClient, HttpAuthorityClient};
