//! Reviewer assignment for pull requests within teams.

pub mod directory;
pub mod engine;
pub mod error;
pub mod locks;
pub mod model;
pub mod repository;
pub mod selection;
pub mod stats;

pub use directory::Directory;
pub use engine::{AssignmentEngine, Reassignment, MAX_INITIAL_REVIEWERS};
pub use error::{AssignmentError, RepositoryError};
pub use model::*;
pub use repository::{
    EntityStore, InMemoryRepository, PullRequestRepository, TeamRepository, UserRepository,
};
pub use selection::{RandomPicker, ReviewerPicker};
pub use stats::{AssignmentStats, StatsAggregator};
