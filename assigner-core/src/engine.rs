//! Reviewer assignment workflows.
//!
//! The engine owns the three mutating operations on a pull request:
//!
//! ```text
//!         create()                 merge()
//!  [none] --------> OPEN  --------------------> MERGED (terminal)
//!                     |  reassign() (stays OPEN)
//!                     +--------------------------+
//! ```
//!
//! Every workflow takes the pull request's record lock, checks all
//! preconditions, and only then writes. A failed workflow leaves the stored
//! record untouched.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::directory::Directory;
use crate::error::{AssignmentError, RepositoryError};
use crate::locks::RecordLocks;
use crate::model::{EntityKind, PrStatus, PullRequest, PullRequestId, UserId};
use crate::repository::EntityStore;
use crate::selection::ReviewerPicker;

/// Reviewers assigned when a pull request is created, at most.
pub const MAX_INITIAL_REVIEWERS: usize = 2;

/// Outcome of a successful reassignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassignment {
    pub pull_request: PullRequest,
    pub replaced_by: UserId,
}

pub struct AssignmentEngine {
    store: Arc<dyn EntityStore>,
    directory: Directory,
    picker: Arc<dyn ReviewerPicker>,
    locks: RecordLocks,
}

impl AssignmentEngine {
    pub fn new(store: Arc<dyn EntityStore>, picker: Arc<dyn ReviewerPicker>) -> Self {
        Self {
            directory: Directory::new(store.clone()),
            store,
            picker,
            locks: RecordLocks::new(),
        }
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Open a pull request and assign up to two reviewers from the author's team.
    ///
    /// Candidates are the active members of the author's team other than the
    /// author. An empty pool is not an error; the request is simply created
    /// without reviewers.
    pub async fn create_pull_request(
        &self,
        id: PullRequestId,
        name: impl Into<String>,
        author_id: UserId,
    ) -> Result<PullRequest, AssignmentError> {
        let _guard = self.locks.acquire(&id).await;

        if self.store.pull_request_exists(&id).await? {
            debug!("Rejecting create for existing pull request {}", id);
            return Err(AssignmentError::DuplicateRequest(id));
        }

        let author = self.directory.require_user(&author_id).await?;

        let mut candidates = self
            .directory
            .active_team_members(&author.team_name, &author.id)
            .await?;
        self.picker.shuffle(&mut candidates);
        let reviewers: Vec<UserId> = candidates
            .into_iter()
            .take(MAX_INITIAL_REVIEWERS)
            .map(|user| user.id)
            .collect();

        let pr = PullRequest::open(id, name, author.id, reviewers, Utc::now());

        self.store
            .create_pull_request(&pr)
            .await
            .map_err(|e| match e {
                RepositoryError::AlreadyExists {
                    entity: EntityKind::PullRequest,
                    ..
                } => AssignmentError::DuplicateRequest(pr.id.clone()),
                other => other.into(),
            })?;

        info!(
            "Created pull request {} by {} with {} reviewer(s): {:?}",
            pr.id,
            pr.author_id,
            pr.assigned_reviewers.len(),
            pr.assigned_reviewers
        );
        Ok(pr)
    }

    /// Mark a pull request merged. Merging an already merged request returns
    /// it unchanged.
    pub async fn merge_pull_request(
        &self,
        id: &PullRequestId,
    ) -> Result<PullRequest, AssignmentError> {
        let _guard = self.locks.acquire(id).await;

        let pr = self.require_pull_request(id).await?;
        if pr.is_merged() {
            debug!("Pull request {} already merged", id);
            return Ok(pr);
        }

        let merged = self
            .store
            .update_status(id, PrStatus::Merged, Some(Utc::now()))
            .await?;

        info!("Merged pull request {}", id);
        Ok(merged)
    }

    /// Replace `old_reviewer` on an open pull request.
    ///
    /// The replacement is drawn from the active members of the *outgoing
    /// reviewer's* team, excluding the author and everyone already assigned.
    /// Creation draws from the author's team instead.
    pub async fn reassign_reviewer(
        &self,
        id: &PullRequestId,
        old_reviewer: &UserId,
    ) -> Result<Reassignment, AssignmentError> {
        let _guard = self.locks.acquire(id).await;

        let pr = self.require_pull_request(id).await?;
        if pr.is_merged() {
            warn!("Rejecting reassignment on merged pull request {}", id);
            return Err(AssignmentError::RequestClosed(id.clone()));
        }
        if !pr.has_reviewer(old_reviewer) {
            return Err(AssignmentError::ReviewerNotAssigned {
                pull_request: id.clone(),
                reviewer: old_reviewer.clone(),
            });
        }

        let outgoing = self.directory.require_user(old_reviewer).await?;

        let candidates: Vec<UserId> = self
            .directory
            .active_team_members(&outgoing.team_name, &pr.author_id)
            .await?
            .into_iter()
            .map(|user| user.id)
            .filter(|candidate| candidate != old_reviewer && !pr.has_reviewer(candidate))
            .collect();

        if candidates.is_empty() {
            return Err(AssignmentError::NoEligibleCandidate {
                pull_request: id.clone(),
                reviewer: old_reviewer.clone(),
            });
        }

        let replaced_by = candidates[self.picker.pick(candidates.len())].clone();

        let mut reviewers: Vec<UserId> = pr
            .assigned_reviewers
            .iter()
            .filter(|r| *r != old_reviewer)
            .cloned()
            .collect();
        reviewers.push(replaced_by.clone());

        self.store.update_reviewers(id, &reviewers).await?;
        let pull_request = self.require_pull_request(id).await?;

        info!(
            "Reassigned pull request {}: {} -> {}",
            id, old_reviewer, replaced_by
        );
        Ok(Reassignment {
            pull_request,
            replaced_by,
        })
    }

    async fn require_pull_request(
        &self,
        id: &PullRequestId,
    ) -> Result<PullRequest, AssignmentError> {
        self.store
            .get_pull_request(id)
            .await?
            .ok_or_else(|| AssignmentError::not_found(EntityKind::PullRequest, id))
    }
}
