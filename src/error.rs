//! Error taxonomy crossing the serving boundary.

use thiserror::Error;

use crate::models::ModelKey;

/// Failures surfaced to callers of the serving API.
///
/// Cloneable so a single batch-level failure can fan out to every request
/// in the affected batch. No variant is retried internally; retry policy
/// belongs to the transport layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServeError {
    /// The key is not in the catalogue. Caller error.
    #[error("model not found: {0}")]
    ModelNotFound(ModelKey),

    /// Another load or unload currently holds the key. Callers may retry.
    #[error("model busy: {key}")]
    Busy { key: ModelKey },

    /// The loader reported a failure; the entry is parked in Failed until
    /// a later load attempt.
    #[error("model load failed for {key}: {detail}")]
    ModelLoadFailed { key: ModelKey, detail: String },

    #[error("model unload failed for {key}: {detail}")]
    ModelUnloadFailed { key: ModelKey, detail: String },

    /// One batch's capability invocation failed. Registry state and other
    /// batches are unaffected.
    #[error("invocation failed for {key}: {detail}")]
    Invocation { key: ModelKey, detail: String },

    /// The runtime is draining and no longer accepts requests.
    #[error("runtime is shutting down")]
    ShuttingDown,
}
