use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use assigner_core::{EntityStore, InMemoryRepository, RandomPicker, ReviewerPicker};
use assigner_server::{app, AppState, Config, SqliteRepository, StoreBackend};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        "Starting review assigner {}",
        assigner_server::get_service_version()
    );

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let store: Arc<dyn EntityStore> = match config.store_backend {
        StoreBackend::Sqlite => {
            let db_path = config.database_path();
            info!("Using SQLite store at {}", db_path.display());
            let repo = SqliteRepository::new(&db_path).with_context(|| {
                format!("Failed to open SQLite database at {}", db_path.display())
            })?;
            Arc::new(repo)
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; state will not survive restart");
            Arc::new(InMemoryRepository::new())
        }
    };

    let picker: Arc<dyn ReviewerPicker> = match config.rng_seed {
        Some(seed) => {
            info!("Reviewer selection seeded with {}", seed);
            Arc::new(RandomPicker::seeded(seed))
        }
        None => Arc::new(RandomPicker::from_entropy()),
    };

    let state = Arc::new(AppState::new(store, picker));
    let router = app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, router)
        .await
        .context("Server error")?;

    Ok(())
}
