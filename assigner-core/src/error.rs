//! Error types for the store boundary and the assignment workflows.

use thiserror::Error;

use crate::model::{EntityKind, PullRequestId, UserId};

/// Failure reported by an entity store.
///
/// "Not found" on a lookup is `Ok(None)`, not an error. `NotFound` is only
/// returned by mutations that target a missing record.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{entity} '{id}' already exists")]
    AlreadyExists { entity: EntityKind, id: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: EntityKind, id: String },

    #[error("storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    #[error("corrupt {what} in storage")]
    Corruption { what: &'static str },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: &'static str) -> Self {
        Self::Corruption { what }
    }

    pub fn already_exists(entity: EntityKind, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.into(),
        }
    }

    pub fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Typed failure of a directory or assignment operation.
#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error("pull request '{0}' already exists")]
    DuplicateRequest(PullRequestId),

    #[error("team '{0}' already exists")]
    DuplicateTeam(String),

    #[error("{entity} '{id}' not found")]
    EntityNotFound { entity: EntityKind, id: String },

    #[error("pull request '{0}' is merged")]
    RequestClosed(PullRequestId),

    #[error("user '{reviewer}' is not assigned to pull request '{pull_request}'")]
    ReviewerNotAssigned {
        pull_request: PullRequestId,
        reviewer: UserId,
    },

    #[error("no active replacement candidate for '{reviewer}' on pull request '{pull_request}'")]
    NoEligibleCandidate {
        pull_request: PullRequestId,
        reviewer: UserId,
    },

    #[error(transparent)]
    StoreFailure(#[from] RepositoryError),
}

impl AssignmentError {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        Self::EntityNotFound {
            entity,
            id: id.to_string(),
        }
    }
}
