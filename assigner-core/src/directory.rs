//! Team and user directory.
//!
//! Thin façade over the entity store for everything about teams and users.
//! The assignment engine resolves users only through this type.

use std::sync::Arc;

use tracing::info;

use crate::error::{AssignmentError, RepositoryError};
use crate::model::{EntityKind, PullRequestShort, Team, User, UserId};
use crate::repository::EntityStore;

#[derive(Clone)]
pub struct Directory {
    store: Arc<dyn EntityStore>,
}

impl Directory {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn get_user(&self, id: &UserId) -> Result<Option<User>, AssignmentError> {
        Ok(self.store.get_user(id).await?)
    }

    /// Like `get_user`, but a missing user is `EntityNotFound`.
    pub async fn require_user(&self, id: &UserId) -> Result<User, AssignmentError> {
        self.get_user(id)
            .await?
            .ok_or_else(|| AssignmentError::not_found(EntityKind::User, id))
    }

    /// Active members of `team_name`, minus `exclude`.
    pub async fn active_team_members(
        &self,
        team_name: &str,
        exclude: &UserId,
    ) -> Result<Vec<User>, AssignmentError> {
        Ok(self.store.list_active_by_team(team_name, exclude).await?)
    }

    pub async fn set_is_active(
        &self,
        id: &UserId,
        is_active: bool,
    ) -> Result<User, AssignmentError> {
        let user = self
            .store
            .set_user_active(id, is_active)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound { entity, id } => {
                    AssignmentError::EntityNotFound { entity, id }
                }
                other => other.into(),
            })?;
        info!("User {} is_active set to {}", user.id, user.is_active);
        Ok(user)
    }

    /// Register a team and its members, returning the stored team.
    pub async fn create_team(&self, team: &Team) -> Result<Team, AssignmentError> {
        if self.store.team_exists(&team.name).await? {
            return Err(AssignmentError::DuplicateTeam(team.name.clone()));
        }

        self.store.create_team(team).await.map_err(|e| match e {
            // Lost a race with a concurrent registration of the same name
            RepositoryError::AlreadyExists {
                entity: EntityKind::Team,
                ..
            } => AssignmentError::DuplicateTeam(team.name.clone()),
            other => other.into(),
        })?;

        info!(
            "Created team {} with {} members",
            team.name,
            team.members.len()
        );
        self.get_team(&team.name).await
    }

    pub async fn get_team(&self, name: &str) -> Result<Team, AssignmentError> {
        self.store
            .get_team(name)
            .await?
            .ok_or_else(|| AssignmentError::not_found(EntityKind::Team, name))
    }

    /// The user together with every pull request they are assigned to.
    pub async fn get_user_reviews(
        &self,
        id: &UserId,
    ) -> Result<(User, Vec<PullRequestShort>), AssignmentError> {
        let user = self.require_user(id).await?;
        let reviews = self.store.list_by_reviewer(id).await?;
        Ok((user, reviews))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TeamMember;
    use crate::repository::InMemoryRepository;

    fn directory() -> Directory {
        Directory::new(Arc::new(InMemoryRepository::new()))
    }

    fn backend_team() -> Team {
        Team {
            name: "backend".to_string(),
            members: vec![
                TeamMember::new("u1", "Alice", true),
                TeamMember::new("u2", "Bob", true),
            ],
        }
    }

    #[tokio::test]
    async fn test_create_team_returns_stored_team() {
        let directory = directory();
        let team = directory.create_team(&backend_team()).await.unwrap();
        assert_eq!(team.name, "backend");
        assert_eq!(team.members.len(), 2);
    }

    #[tokio::test]
    async fn test_create_team_twice_is_duplicate() {
        let directory = directory();
        directory.create_team(&backend_team()).await.unwrap();

        let result = directory.create_team(&backend_team()).await;
        assert!(matches!(result, Err(AssignmentError::DuplicateTeam(name)) if name == "backend"));
    }

    #[tokio::test]
    async fn test_get_missing_team_is_not_found() {
        let result = directory().get_team("nope").await;
        assert!(matches!(
            result,
            Err(AssignmentError::EntityNotFound {
                entity: EntityKind::Team,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_set_is_active_toggles_and_reports_missing() {
        let directory = directory();
        directory.create_team(&backend_team()).await.unwrap();

        let user = directory
            .set_is_active(&UserId::from("u2"), false)
            .await
            .unwrap();
        assert!(!user.is_active);

        let members = directory
            .active_team_members("backend", &UserId::from("u1"))
            .await
            .unwrap();
        assert!(members.is_empty());

        let missing = directory.set_is_active(&UserId::from("ghost"), true).await;
        assert!(matches!(
            missing,
            Err(AssignmentError::EntityNotFound {
                entity: EntityKind::User,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_get_user_reviews_requires_user() {
        let result = directory().get_user_reviews(&UserId::from("ghost")).await;
        assert!(matches!(
            result,
            Err(AssignmentError::EntityNotFound { .. })
        ));
    }
}
