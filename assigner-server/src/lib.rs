pub mod config;
pub mod routes;
pub mod sqlite;

use std::sync::Arc;

use assigner_core::{AssignmentEngine, EntityStore, ReviewerPicker, StatsAggregator};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use config::{Config, StoreBackend};
pub use sqlite::SqliteRepository;

pub fn get_service_version() -> String {
    // Release builds can stamp a git hash; otherwise report the crate version.
    short_version(option_env!("ASSIGNER_GIT_HASH"), env!("CARGO_PKG_VERSION"))
}

fn short_version(git_hash: Option<&str>, fallback: &str) -> String {
    match git_hash {
        Some(hash) if !hash.is_empty() => hash.chars().take(8).collect(),
        _ => fallback.to_string(),
    }
}

pub struct AppState {
    pub engine: AssignmentEngine,
    pub stats: StatsAggregator,
}

impl AppState {
    pub fn new(store: Arc<dyn EntityStore>, picker: Arc<dyn ReviewerPicker>) -> Self {
        Self {
            engine: AssignmentEngine::new(store.clone(), picker),
            stats: StatsAggregator::new(store),
        }
    }
}

/// Full application router with request tracing.
pub fn app(state: Arc<AppState>) -> Router {
    routes::api_router()
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_version_truncates_to_eight_chars() {
        assert_eq!(short_version(Some("0123456789abcdef"), "0.1.0"), "01234567");
        assert_eq!(short_version(Some("abc"), "0.1.0"), "abc");
    }

    #[test]
    fn test_short_version_handles_multibyte_hash() {
        assert_eq!(short_version(Some("ééééééééé"), "0.1.0"), "éééééééé");
    }

    #[test]
    fn test_short_version_falls_back_without_hash() {
        assert_eq!(short_version(None, "0.1.0"), "0.1.0");
        assert_eq!(short_version(Some(""), "0.1.0"), "0.1.0");
    }
}
