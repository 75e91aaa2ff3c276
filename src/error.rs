//! Error types for incident-dedup.
//!
//! Contention on a claim is not an error; it is reported as a
//! [`ClaimResult::AlreadyClaimed`](crate::store::ClaimResult). Errors here
//! are either caller mistakes or store trouble.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("lock store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a failed store call is worth another attempt.
    ///
    /// Row decoding and caller errors will fail the same way every time;
    /// connection trouble, pool exhaustion and timeouts may not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::StoreUnavailable(_) | Error::Timeout(_) => true,
            Error::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Database(_)
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
