pub mod api;
pub mod bootstrap;
pub mod coordinator;
pub mod replication;
pub mod routes;
pub mod state;

pub use coordinator::ServerCoordinator;
pub use replication::{LoggingReplicationAdapter, ReplicationAdapter};
pub use state::AppState;
