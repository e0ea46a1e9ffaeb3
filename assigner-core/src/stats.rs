//! Reviewer assignment statistics.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::AssignmentError;
use crate::model::{PullRequestId, UserId};
use crate::repository::EntityStore;

/// Counts derived from the reviewer lists currently stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssignmentStats {
    /// Number of pull requests each user is assigned to.
    pub user_assignments: BTreeMap<UserId, usize>,
    /// Number of reviewers on each pull request, including zero.
    pub pr_assignments: BTreeMap<PullRequestId, usize>,
}

impl AssignmentStats {
    /// Build the counts from `(pull request, reviewers)` pairs.
    pub fn from_reviewer_lists<'a, I>(lists: I) -> Self
    where
        I: IntoIterator<Item = (&'a PullRequestId, &'a [UserId])>,
    {
        let mut stats = Self::default();
        for (pr_id, reviewers) in lists {
            stats.pr_assignments.insert(pr_id.clone(), reviewers.len());
            for reviewer in reviewers {
                *stats.user_assignments.entry(reviewer.clone()).or_insert(0) += 1;
            }
        }
        stats
    }

    pub fn total_assignments(&self) -> usize {
        self.pr_assignments.values().sum()
    }
}

/// Read-only view over the store's reviewer counts.
pub struct StatsAggregator {
    store: Arc<dyn EntityStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn snapshot(&self) -> Result<AssignmentStats, AssignmentError> {
        Ok(self.store.aggregate_stats().await?)
    }
}
