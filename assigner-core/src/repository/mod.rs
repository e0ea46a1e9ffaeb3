//! Entity store abstraction.
//!
//! These traits are the only path from the workflows to storage. Backends
//! (in-memory here, SQLite in the server crate) must behave identically:
//! lookups return `Ok(None)` for missing records, each call is atomic on its
//! own, and inserting a duplicate key fails with
//! `RepositoryError::AlreadyExists` instead of overwriting.

mod memory;

pub use memory::InMemoryRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RepositoryError;
use crate::model::{PrStatus, PullRequest, PullRequestId, PullRequestShort, Team, User, UserId};
use crate::stats::AssignmentStats;

#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Insert a team and upsert each of its members as a user of that team.
    async fn create_team(&self, team: &Team) -> Result<(), RepositoryError>;

    /// Get a team with its current members, returning None if not found.
    async fn get_team(&self, name: &str) -> Result<Option<Team>, RepositoryError>;

    async fn team_exists(&self, name: &str) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Get a user, returning None if not found.
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    /// Set a user's active flag. Fails with `NotFound` for an unknown user.
    async fn set_user_active(&self, id: &UserId, is_active: bool)
        -> Result<User, RepositoryError>;

    /// Active members of `team_name` other than `exclude`, ordered by user id.
    async fn list_active_by_team(
        &self,
        team_name: &str,
        exclude: &UserId,
    ) -> Result<Vec<User>, RepositoryError>;
}

#[async_trait]
pub trait PullRequestRepository: Send + Sync {
    /// Insert a pull request together with its reviewers.
    ///
    /// Fails with `AlreadyExists` if the id is taken; the existing record is
    /// left untouched.
    async fn create_pull_request(&self, pr: &PullRequest) -> Result<(), RepositoryError>;

    /// Get a pull request, returning None if not found.
    async fn get_pull_request(
        &self,
        id: &PullRequestId,
    ) -> Result<Option<PullRequest>, RepositoryError>;

    /// Set status and merge time, returning the updated record.
    async fn update_status(
        &self,
        id: &PullRequestId,
        status: PrStatus,
        merged_at: Option<DateTime<Utc>>,
    ) -> Result<PullRequest, RepositoryError>;

    /// Replace the reviewer list of a pull request.
    async fn update_reviewers(
        &self,
        id: &PullRequestId,
        reviewers: &[UserId],
    ) -> Result<(), RepositoryError>;

    /// Pull requests `user_id` is currently assigned to review.
    async fn list_by_reviewer(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PullRequestShort>, RepositoryError>;

    async fn pull_request_exists(&self, id: &PullRequestId) -> Result<bool, RepositoryError>;

    /// Reviewer counts per user and per pull request, from current state.
    async fn aggregate_stats(&self) -> Result<AssignmentStats, RepositoryError>;
}

/// A backend that stores all three entity kinds.
pub trait EntityStore: TeamRepository + UserRepository + PullRequestRepository {}

impl<T> EntityStore for T where T: TeamRepository + UserRepository + PullRequestRepository {}
