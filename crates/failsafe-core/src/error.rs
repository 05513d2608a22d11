use std::time::Duration;

use thiserror::Error;

/// Coarse classification used by batch drivers to decide how loudly to
/// report a failure and whether the next scheduled run can recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// A source or shared snapshot could not be located.
    NotFound,
    /// An identifier collides with something already present.
    Conflict,
    /// The backend or transport rejected a call.
    BackendFailure,
    /// The completion waiter gave up.
    Timeout,
    /// Configuration or identifier validation failed before any backend call.
    Invalid,
}

impl ErrorClass {
    /// Label used for metrics and log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::BackendFailure => "backend_failure",
            Self::Timeout => "timeout",
            Self::Invalid => "invalid",
        }
    }
}

/// Canonical error type for the replication pipeline.
#[derive(Debug, Error)]
pub enum FailsafeError {
    /// The instance has no completed automatic snapshot to promote.
    #[error("no automated snapshot available for instance `{instance}`")]
    NoSourceSnapshot {
        /// Instance that was queried.
        instance: String,
    },

    /// The account-wide shared snapshot query came back empty.
    #[error("no shared snapshots are visible to this account")]
    NoSharedSnapshots,

    /// No shared snapshot matched the requested manual identifier.
    #[error("shared snapshot with id `...:{snapshot_id}` not found")]
    SharedSnapshotNotFound {
        /// Manual identifier that was searched for.
        snapshot_id: String,
    },

    /// More than one shared snapshot matched the requested manual identifier.
    #[error("shared snapshot `{snapshot_id}` is ambiguous: {} candidates ({})", candidates.len(), candidates.join(", "))]
    AmbiguousSharedSnapshot {
        /// Manual identifier that was searched for.
        snapshot_id: String,
        /// Every fully-qualified identifier that matched.
        candidates: Vec<String>,
    },

    /// A snapshot identifier does not follow the expected naming convention.
    #[error("snapshot id `{id}` does not start with `{expected_prefix}`")]
    InvalidName {
        /// Offending identifier.
        id: String,
        /// Prefix the naming scheme expected.
        expected_prefix: String,
    },

    /// The backend moved a snapshot to the `failed` state.
    #[error("snapshot `{snapshot_id}` entered terminal status `{status}`")]
    SnapshotFailed {
        /// Snapshot being waited on.
        snapshot_id: String,
        /// Status reported by the backend.
        status: String,
    },

    /// The completion waiter exceeded its bound.
    #[error("timed out after {waited:?} waiting for snapshot `{snapshot_id}`")]
    Timeout {
        /// Snapshot being waited on.
        snapshot_id: String,
        /// Total time spent polling.
        waited: Duration,
    },

    /// Snapshot backend call was rejected.
    #[error("backend error: {0}")]
    Backend(String),

    /// Notification transport call was rejected.
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Notification payload could not be decoded.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Notification payload could not be encoded.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// I/O error occurred while reading configuration or event files.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FailsafeError {
    /// Creates a `NoSourceSnapshot` variant.
    #[must_use]
    pub fn no_source_snapshot(instance: impl Into<String>) -> Self {
        Self::NoSourceSnapshot {
            instance: instance.into(),
        }
    }

    /// Creates a `SharedSnapshotNotFound` variant.
    #[must_use]
    pub fn shared_not_found(snapshot_id: impl Into<String>) -> Self {
        Self::SharedSnapshotNotFound {
            snapshot_id: snapshot_id.into(),
        }
    }

    /// Creates an `InvalidName` variant.
    #[must_use]
    pub fn invalid_name(id: impl Into<String>, expected_prefix: impl Into<String>) -> Self {
        Self::InvalidName {
            id: id.into(),
            expected_prefix: expected_prefix.into(),
        }
    }

    /// Creates a `Backend` variant.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Creates a `Transport` variant.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a `Configuration` variant.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Classifies the error for reporting.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoSourceSnapshot { .. }
            | Self::NoSharedSnapshots
            | Self::SharedSnapshotNotFound { .. } => ErrorClass::NotFound,
            Self::AmbiguousSharedSnapshot { .. } => ErrorClass::Conflict,
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::SnapshotFailed { .. }
            | Self::Backend(_)
            | Self::Transport(_)
            | Self::IoError(_) => ErrorClass::BackendFailure,
            Self::InvalidName { .. }
            | Self::Configuration(_)
            | Self::DeserializationError(_)
            | Self::SerializationError(_) => ErrorClass::Invalid,
        }
    }

    /// Not-found conditions abort the current item without side effects and
    /// are expected to resolve on a later run.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}

impl From<serde_json::Error> for FailsafeError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() || err.is_syntax() || err.is_data() {
            Self::DeserializationError(err.to_string())
        } else {
            Self::SerializationError(err.to_string())
        }
    }
}

impl From<config::ConfigError> for FailsafeError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Convenient result alias for pipeline operations.
pub type FailsafeResult<T> = Result<T, FailsafeError>;
