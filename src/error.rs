use thiserror::Error;

/// Errors produced by this crate.
///
/// Usage errors and invariant violations are always propagated to the
/// caller. Transport-level errors (`Redis`, `Pool`) are propagated by
/// single-item operations but are caught and logged by the bulk pipeline
/// and requeue-script paths, which degrade to partial-success counts
/// instead.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Data found in Redis is inconsistent with an invariant this crate
    /// relies on (a colliding item key, a stale temp-failed key, a sublist
    /// entry with no matching record). Always fatal: it means either a
    /// clock/uuid collision or concurrent corruption from outside this
    /// crate's protocol.
    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("connection pool error: {0}")]
    Pool(#[from] bb8::RunError<redis::RedisError>),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;
