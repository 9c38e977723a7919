//! Error taxonomy
//!
//! A single enum covers every failure mode the engine can surface to a
//! caller. Low-level causes (`rusqlite`, I/O, HTTP) are wrapped rather
//! than leaked, so every call site can match on the taxonomy instead of
//! the underlying library's error type.

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Error taxonomy (spec §7).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Row or entity absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or invalid credential.
    #[error("unauthorized")]
    Unauthorized,

    /// Credential valid, resource belongs to another user.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Duplicate content hash at ingest. Callers that want this surfaced
    /// rather than coalesced can match on it explicitly; the ingestion
    /// pipeline itself never returns it (it coalesces, per spec §4.7).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An external call or pool acquisition exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A required external dependency (embedding service) is down.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Decryption auth-tag mismatch, or a persisted vector has the wrong
    /// dimensionality. Fatal for the affected record; never masked.
    #[error("corrupt record {id}: {reason}")]
    Corrupt {
        /// The record id the corruption was detected on.
        id: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A programming invariant was violated. Never returned verbatim to
    /// an external caller in a production deployment.
    #[error("internal error: {0}")]
    Internal(String),

    /// Underlying SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying HTTP error from the embedding client.
    #[error("embedding transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl MemoryError {
    /// True for errors that are safe to retry on a read path (spec §7:
    /// "low-level errors are recovered locally when idempotent").
    pub fn is_retryable(&self) -> bool {
        matches!(self, MemoryError::Timeout(_) | MemoryError::Unavailable(_))
    }
}
