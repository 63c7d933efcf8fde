/// Shared error type used across every Konsul crate.
///
/// Variants map onto the error kinds enumerated in the coordination
/// engine's design: store/ACL/rate-limit/sync failures all resolve to one
/// of these, and the HTTP transport maps each to a status code.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("CAS conflict on {key}: expected index {expected}, current index {current}")]
    CasConflict {
        key: String,
        expected: u64,
        current: u64,
    },

    #[error("not leader{}", .leader_addr.as_deref().map(|a| format!(" (leader at {a})")).unwrap_or_default())]
    NotLeader { leader_addr: Option<String> },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable tag, used in HTTP error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::NotFound(_) => "not_found",
            Error::AlreadyExists(_) => "already_exists",
            Error::CasConflict { .. } => "cas_conflict",
            Error::NotLeader { .. } => "not_leader",
            Error::RateLimited(_) => "rate_limited",
            Error::Forbidden(_) => "forbidden",
            Error::Unavailable(_) => "unavailable",
            Error::Internal(_) => "internal",
        }
    }
}
