//! In-memory implementation of the entity store.
//!
//! All state is held in memory and lost on restart. Each table sits behind
//! its own `RwLock`; when an operation needs two tables it always takes
//! `teams` before `users`.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{PullRequestRepository, TeamRepository, UserRepository};
use crate::error::RepositoryError;
use crate::model::{
    EntityKind, PrStatus, PullRequest, PullRequestId, PullRequestShort, Team, TeamMember, User,
    UserId,
};
use crate::stats::AssignmentStats;

/// In-memory entity store.
pub struct InMemoryRepository {
    teams: RwLock<HashSet<String>>,
    users: RwLock<HashMap<UserId, User>>,
    pull_requests: RwLock<HashMap<PullRequestId, PullRequest>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            teams: RwLock::new(HashSet::new()),
            users: RwLock::new(HashMap::new()),
            pull_requests: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TeamRepository for InMemoryRepository {
    async fn create_team(&self, team: &Team) -> Result<(), RepositoryError> {
        let mut teams = self.teams.write().await;
        if teams.contains(&team.name) {
            return Err(RepositoryError::already_exists(
                EntityKind::Team,
                team.name.clone(),
            ));
        }

        let mut users = self.users.write().await;
        teams.insert(team.name.clone());
        for member in &team.members {
            users.insert(member.user_id.clone(), member.to_user(&team.name));
        }
        Ok(())
    }

    async fn get_team(&self, name: &str) -> Result<Option<Team>, RepositoryError> {
        let teams = self.teams.read().await;
        if !teams.contains(name) {
            return Ok(None);
        }

        let users = self.users.read().await;
        let mut members: Vec<TeamMember> = users
            .values()
            .filter(|user| user.team_name == name)
            .map(TeamMember::from)
            .collect();
        members.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        Ok(Some(Team {
            name: name.to_string(),
            members,
        }))
    }

    async fn team_exists(&self, name: &str) -> Result<bool, RepositoryError> {
        let teams = self.teams.read().await;
        Ok(teams.contains(name))
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(id).cloned())
    }

    async fn set_user_active(
        &self,
        id: &UserId,
        is_active: bool,
    ) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(id)
            .ok_or_else(|| RepositoryError::not_found(EntityKind::User, id.as_str()))?;
        user.is_active = is_active;
        Ok(user.clone())
    }

    async fn list_active_by_team(
        &self,
        team_name: &str,
        exclude: &UserId,
    ) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut active: Vec<User> = users
            .values()
            .filter(|user| user.team_name == team_name && user.is_active && &user.id != exclude)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }
}

#[async_trait]
impl PullRequestRepository for InMemoryRepository {
    async fn create_pull_request(&self, pr: &PullRequest) -> Result<(), RepositoryError> {
        use std::collections::hash_map::Entry;

        let mut pull_requests = self.pull_requests.write().await;
        match pull_requests.entry(pr.id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::already_exists(
                EntityKind::PullRequest,
                pr.id.as_str(),
            )),
            Entry::Vacant(entry) => {
                entry.insert(pr.clone());
                Ok(())
            }
        }
    }

    async fn get_pull_request(
        &self,
        id: &PullRequestId,
    ) -> Result<Option<PullRequest>, RepositoryError> {
        let pull_requests = self.pull_requests.read().await;
        Ok(pull_requests.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &PullRequestId,
        status: PrStatus,
        merged_at: Option<DateTime<Utc>>,
    ) -> Result<PullRequest, RepositoryError> {
        let mut pull_requests = self.pull_requests.write().await;
        let pr = pull_requests
            .get_mut(id)
            .ok_or_else(|| RepositoryError::not_found(EntityKind::PullRequest, id.as_str()))?;
        pr.status = status;
        pr.merged_at = merged_at;
        Ok(pr.clone())
    }

    async fn update_reviewers(
        &self,
        id: &PullRequestId,
        reviewers: &[UserId],
    ) -> Result<(), RepositoryError> {
        let mut pull_requests = self.pull_requests.write().await;
        let pr = pull_requests
            .get_mut(id)
            .ok_or_else(|| RepositoryError::not_found(EntityKind::PullRequest, id.as_str()))?;
        pr.assigned_reviewers = reviewers.to_vec();
        Ok(())
    }

    async fn list_by_reviewer(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PullRequestShort>, RepositoryError> {
        let pull_requests = self.pull_requests.read().await;
        // Ordered by id to match the SQLite backend
        let assigned: BTreeMap<&PullRequestId, PullRequestShort> = pull_requests
            .values()
            .filter(|pr| pr.has_reviewer(user_id))
            .map(|pr| (&pr.id, PullRequestShort::from(pr)))
            .collect();
        Ok(assigned.into_values().collect())
    }

    async fn pull_request_exists(&self, id: &PullRequestId) -> Result<bool, RepositoryError> {
        let pull_requests = self.pull_requests.read().await;
        Ok(pull_requests.contains_key(id))
    }

    async fn aggregate_stats(&self) -> Result<AssignmentStats, RepositoryError> {
        let pull_requests = self.pull_requests.read().await;
        Ok(AssignmentStats::from_reviewer_lists(
            pull_requests
                .values()
                .map(|pr| (&pr.id, pr.assigned_reviewers.as_slice())),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_team() -> Team {
        Team {
            name: "backend".to_string(),
            members: vec![
                TeamMember::new("u1", "Alice", true),
                TeamMember::new("u2", "Bob", true),
                TeamMember::new("u3", "Carol", false),
            ],
        }
    }

    fn open_pr(id: &str, reviewers: &[&str]) -> PullRequest {
        PullRequest::open(
            PullRequestId::from(id),
            "Title",
            UserId::from("u1"),
            reviewers.iter().map(|r| UserId::from(*r)).collect(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_get_returns_none_for_missing() {
        let repo = InMemoryRepository::new();
        assert!(repo.get_team("nope").await.unwrap().is_none());
        assert!(repo.get_user(&UserId::from("nope")).await.unwrap().is_none());
        assert!(repo
            .get_pull_request(&PullRequestId::from("nope"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_create_team_registers_members() {
        let repo = InMemoryRepository::new();
        repo.create_team(&backend_team()).await.unwrap();

        assert!(repo.team_exists("backend").await.unwrap());
        let team = repo.get_team("backend").await.unwrap().unwrap();
        assert_eq!(team.members.len(), 3);

        let user = repo.get_user(&UserId::from("u2")).await.unwrap().unwrap();
        assert_eq!(user.team_name, "backend");
    }

    #[tokio::test]
    async fn test_create_team_rejects_duplicate_name() {
        let repo = InMemoryRepository::new();
        repo.create_team(&backend_team()).await.unwrap();

        let result = repo.create_team(&backend_team()).await;
        assert!(matches!(
            result,
            Err(RepositoryError::AlreadyExists {
                entity: EntityKind::Team,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_member_re_registered_moves_team() {
        let repo = InMemoryRepository::new();
        repo.create_team(&backend_team()).await.unwrap();
        repo.create_team(&Team {
            name: "frontend".to_string(),
            members: vec![TeamMember::new("u2", "Bob", true)],
        })
        .await
        .unwrap();

        let backend = repo.get_team("backend").await.unwrap().unwrap();
        assert!(backend.members.iter().all(|m| m.user_id.as_str() != "u2"));
        let frontend = repo.get_team("frontend").await.unwrap().unwrap();
        assert_eq!(frontend.members.len(), 1);
    }

    #[tokio::test]
    async fn test_list_active_by_team_filters_and_orders() {
        let repo = InMemoryRepository::new();
        repo.create_team(&Team {
            name: "backend".to_string(),
            members: vec![
                TeamMember::new("u4", "Dan", true),
                TeamMember::new("u1", "Alice", true),
                TeamMember::new("u3", "Carol", false),
                TeamMember::new("u2", "Bob", true),
            ],
        })
        .await
        .unwrap();

        let active = repo
            .list_active_by_team("backend", &UserId::from("u1"))
            .await
            .unwrap();
        let ids: Vec<&str> = active.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["u2", "u4"]);
    }

    #[tokio::test]
    async fn test_set_user_active_unknown_user() {
        let repo = InMemoryRepository::new();
        let result = repo.set_user_active(&UserId::from("ghost"), false).await;
        assert!(matches!(
            result,
            Err(RepositoryError::NotFound {
                entity: EntityKind::User,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_create_pull_request_rejects_duplicate_and_keeps_original() {
        let repo = InMemoryRepository::new();
        repo.create_pull_request(&open_pr("pr1", &["u2"]))
            .await
            .unwrap();

        let result = repo.create_pull_request(&open_pr("pr1", &["u3"])).await;
        assert!(matches!(
            result,
            Err(RepositoryError::AlreadyExists {
                entity: EntityKind::PullRequest,
                ..
            })
        ));

        let stored = repo
            .get_pull_request(&PullRequestId::from("pr1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.assigned_reviewers, vec![UserId::from("u2")]);
    }

    #[tokio::test]
    async fn test_update_on_missing_pull_request_fails() {
        let repo = InMemoryRepository::new();
        let id = PullRequestId::from("missing");

        assert!(matches!(
            repo.update_status(&id, PrStatus::Merged, Some(Utc::now()))
                .await,
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(matches!(
            repo.update_reviewers(&id, &[]).await,
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_by_reviewer_and_stats() {
        let repo = InMemoryRepository::new();
        repo.create_pull_request(&open_pr("pr2", &["u2", "u3"]))
            .await
            .unwrap();
        repo.create_pull_request(&open_pr("pr1", &["u2"]))
            .await
            .unwrap();
        repo.create_pull_request(&open_pr("pr3", &[])).await.unwrap();

        let reviews = repo.list_by_reviewer(&UserId::from("u2")).await.unwrap();
        let ids: Vec<&str> = reviews.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["pr1", "pr2"]);

        let stats = repo.aggregate_stats().await.unwrap();
        assert_eq!(stats.user_assignments.get(&UserId::from("u2")), Some(&2));
        assert_eq!(stats.user_assignments.get(&UserId::from("u3")), Some(&1));
        assert_eq!(stats.pr_assignments.get(&PullRequestId::from("pr3")), Some(&0));
    }

    #[tokio::test]
    async fn test_stats_reflect_reviewer_updates() {
        let repo = InMemoryRepository::new();
        let id = PullRequestId::from("pr1");
        repo.create_pull_request(&open_pr("pr1", &["u2"]))
            .await
            .unwrap();
        repo.update_reviewers(&id, &[UserId::from("u3")])
            .await
            .unwrap();

        let stats = repo.aggregate_stats().await.unwrap();
        assert_eq!(stats.user_assignments.get(&UserId::from("u2")), None);
        assert_eq!(stats.user_assignments.get(&UserId::from("u3")), Some(&1));
    }
}
