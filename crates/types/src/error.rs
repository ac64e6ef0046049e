//! Unified error type for the grantstore workspace.

use thiserror::Error;

/// Enumerates every way a token store operation can be rejected.
///
/// Reads never fail for a missing or expired token (they return `None`) and
/// removals are idempotent.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The token is malformed (for example an empty value).
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// A token or authentication context could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing storage is unavailable; the operation was rolled back.
    #[error("storage error: {0}")]
    Storage(String),
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl StoreError {
    /// Returns `true` if the error is likely transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, StoreError>;
