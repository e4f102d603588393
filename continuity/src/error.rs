//! Continuity error types
//!
//! Errors exist inside the engine so collaborators can report what went
//! wrong, but none of them cross the public `apply` / `record_run_outcome`
//! boundary. [`try_persist`] is the single place where a failure is turned
//! into a logged cache-miss or no-op.

use std::future::Future;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

use crate::store::StoreError;

/// Result type alias for continuity operations
pub type ContinuityResult<T> = Result<T, ContinuityError>;

/// Errors that can occur inside the continuity engine
#[derive(Error, Debug)]
pub enum ContinuityError {
    /// Version-control command failed
    #[error("Git operation failed: {operation} - {message}")]
    Vcs { operation: String, message: String },

    /// External command exceeded its time budget
    #[error("Command `{command}` timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    /// External command produced more output than allowed
    #[error("Command `{command}` exceeded output buffer of {limit} bytes")]
    OutputOverflow { command: String, limit: usize },

    /// File listing failed
    #[error("File listing failed under {root}: {message}")]
    Listing { root: PathBuf, message: String },

    /// Durable store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Conversation store failure
    #[error("Conversation store error: {message}")]
    Conversation { message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ContinuityError {
    /// Create a version-control error
    pub fn vcs(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Vcs {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(command: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            command: command.into(),
            timeout_ms,
        }
    }

    /// Create an output overflow error
    pub fn overflow(command: impl Into<String>, limit: usize) -> Self {
        Self::OutputOverflow {
            command: command.into(),
            limit,
        }
    }

    /// Create a listing error
    pub fn listing(root: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Listing {
            root: root.into(),
            message: message.into(),
        }
    }

    /// Create a conversation store error
    pub fn conversation(message: impl Into<String>) -> Self {
        Self::Conversation {
            message: message.into(),
        }
    }

    /// Whether the error came from a missing repository rather than a broken one.
    pub fn is_not_a_repository(&self) -> bool {
        match self {
            Self::Vcs { message, .. } => message.to_lowercase().contains("not a git repository"),
            _ => false,
        }
    }
}

/// Await a fallible best-effort operation, logging and discarding any error.
///
/// Returns `None` on failure. Reads treat that as a cache miss, writes as a
/// skipped write.
pub async fn try_persist<T, E, F>(operation: &'static str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(operation, error = %e, "continuity persistence degraded");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_persist_passes_through_ok() {
        let value = try_persist("ok", async { Ok::<_, ContinuityError>(7) }).await;
        assert_eq!(value, Some(7));
    }

    #[tokio::test]
    async fn test_try_persist_swallows_errors() {
        let value: Option<u32> = try_persist("fail", async {
            Err(ContinuityError::vcs("status", "fatal: not a git repository"))
        })
        .await;
        assert!(value.is_none());
    }

    #[test]
    fn test_not_a_repository_detection() {
        let err = ContinuityError::vcs("rev-parse", "fatal: not a git repository (or any parent)");
        assert!(err.is_not_a_repository());
        assert!(!ContinuityError::timeout("git status", 5000).is_not_a_repository());
    }

    #[test]
    fn test_error_display() {
        let err = ContinuityError::overflow("rg --files", 1024);
        assert!(err.to_string().contains("1024"));
    }
}
