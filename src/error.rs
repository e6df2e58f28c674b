//! Error types for Smaragda kernel operations.
//!
//! This module provides the error hierarchy used across the kernel. All
//! fallible operations return `Result<T, SmaragdaError>`, and every variant
//! carries the context a caller needs without re-parsing a string message.
use thiserror::Error;

/// The main error type for Smaragda kernel operations.
#[derive(Error, Debug)]
pub enum SmaragdaError {
    /// A res, genus, or branch id does not resolve to anything in the log.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// What kind of thing was being looked up ("res", "genus", "branch", ...)
        kind: &'static str,
        /// The id that failed to resolve
        id: String,
    },

    /// An attribute write failed type, enum, or reference validation.
    #[error("validation failed for attribute '{key}' on genus '{genus_id}': {reason}")]
    ValidationError {
        /// The genus being validated against
        genus_id: String,
        /// The attribute key
        key: String,
        /// Why validation failed
        reason: String,
    },

    /// `transitionStatus` requested a (from, to) pair the genus never declared.
    #[error("no declared transition from '{from}' to '{to}' on genus '{genus_id}'")]
    InvalidTransition {
        /// The genus whose state machine was consulted
        genus_id: String,
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// `target_status` has no path in the state-machine graph from the current state.
    #[error("no transition path from '{from}' to '{to}' on genus '{genus_id}'")]
    UnreachableStatus {
        /// The genus whose state machine was consulted
        genus_id: String,
        /// Current status
        from: String,
        /// Requested target status
        to: String,
    },

    /// A relationship role's cardinality constraint was violated.
    #[error("role '{role}' on relationship genus '{genus_id}' requires {expected}, got {actual}")]
    CardinalityViolation {
        /// The relationship genus
        genus_id: String,
        /// The role that was violated
        role: String,
        /// What the genus declares
        expected: String,
        /// What was supplied
        actual: usize,
    },

    /// A res referenced by a relationship/feature does not belong to the expected genus.
    #[error("expected res '{res_id}' to be of genus '{expected_genus}', found '{actual_genus}'")]
    GenusMismatch {
        /// The res whose genus was wrong
        res_id: String,
        /// The genus that was required
        expected_genus: String,
        /// The genus the res actually has
        actual_genus: String,
    },

    /// Sync ingest saw the same res id with two different genera.
    #[error(
        "res '{res_id}' diverged: local genus '{local_genus}', incoming genus '{incoming_genus}'"
    )]
    DivergentRes {
        /// The res id in conflict
        res_id: String,
        /// The genus already on record locally
        local_genus: String,
        /// The genus the incoming batch claims
        incoming_genus: String,
    },

    /// `merge` found conflicting attribute_set tessellae and `force` was not set.
    #[error("merge conflict detected; rerun with force=true to resolve")]
    ConflictDetected(Vec<MergeConflict>),

    /// A batch operation failed partway through; wraps the first failing item.
    #[error("batch update failed at item {index}: {source}")]
    BatchItemFailed {
        /// Index of the item that failed within the batch
        index: usize,
        /// The underlying failure
        #[source]
        source: Box<SmaragdaError>,
    },

    /// The storage layer (WAL, index) failed. Fatal for the current operation.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Serialization/deserialization of a tessella payload or wire message failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The caller's bearer token was missing or rejected.
    #[error("authentication error: {0}")]
    AuthError(String),

    /// The sync transport failed to complete a request.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A sync request exceeded its bounded timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A single (res, attribute) conflict surfaced by `merge` without `force`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MergeConflict {
    /// The res on which both branches wrote the same attribute
    pub res_id: String,
    /// The attribute key in conflict
    pub key: String,
    /// The value on the source branch
    pub source_value: serde_json::Value,
    /// The value on the target branch
    pub target_value: serde_json::Value,
}

impl std::fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}: source={} target={}",
            self.res_id, self.key, self.source_value, self.target_value
        )
    }
}

/// Result type alias for Smaragda kernel operations.
pub type SmaragdaResult<T> = Result<T, SmaragdaError>;
