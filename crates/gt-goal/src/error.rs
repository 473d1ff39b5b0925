// error.rs — Error types for the goal hierarchy subsystem.
//
// Two layers: `StoreError` is what an EntityStore backend reports, and
// `GoalError` is what the engine and service report to callers. Store
// failures that carry domain meaning (missing record, duplicate key) are
// lifted into the matching domain variant on conversion.

use std::fmt;

use thiserror::Error;

use crate::model::GoalId;

/// The kind of record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Goal,
    Task,
    User,
    Membership,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Goal => write!(f, "goal"),
            RecordKind::Task => write!(f, "task"),
            RecordKind::User => write!(f, "user"),
            RecordKind::Membership => write!(f, "membership"),
        }
    }
}

/// Errors reported by an [`EntityStore`](crate::store::EntityStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed (I/O, SQL, lock poisoning). Safe to retry.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A versioned goal write lost a race with another writer.
    #[error("goal {id} was modified concurrently (expected version {expected})")]
    StaleVersion { id: GoalId, expected: i64 },

    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The record to update does not exist.
    #[error("{kind} {id} does not exist")]
    MissingRecord { kind: RecordKind, id: i64 },
}

/// Errors that can occur during goal hierarchy operations.
#[derive(Debug, Error)]
pub enum GoalError {
    /// Malformed attributes (empty name, progress out of range, ...).
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// The acting user does not own the goal, parent, or roster involved.
    #[error("ownership check failed: {0}")]
    Ownership(String),

    /// The parent assignment would make a goal its own ancestor.
    #[error("assigning parent {parent} to goal {goal} would create a cycle")]
    Cycle { goal: GoalId, parent: GoalId },

    /// A referenced record is absent.
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: i64 },

    /// Duplicate sibling name or duplicate membership.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The configuration file could not be parsed.
    #[error("invalid config at {path}: {reason}")]
    Config { path: String, reason: String },

    /// The store failed; the operation may be retried.
    #[error(transparent)]
    Store(StoreError),
}

impl GoalError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        GoalError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: RecordKind, id: impl Into<i64>) -> Self {
        GoalError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for generic store failures, which callers may retry as a whole.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GoalError::Store(StoreError::Backend(_)) | GoalError::Store(StoreError::StaleVersion { .. })
        )
    }
}

impl From<StoreError> for GoalError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MissingRecord { kind, id } => GoalError::NotFound { kind, id },
            StoreError::UniqueViolation(what) => GoalError::Conflict(what),
            other => GoalError::Store(other),
        }
    }
}
