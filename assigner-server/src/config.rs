use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;

/// File name of the SQLite database inside `state_dir`.
pub const DATABASE_FILE: &str = "review-assigner.db";

/// Which entity store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// Seed for reviewer selection. Unset means a fresh entropy-seeded generator.
    pub rng_seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let store_backend = parse_store_backend(env::var("STORE_BACKEND").ok())?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let rng_seed = parse_rng_seed(env::var("RNG_SEED").ok())?;

        Ok(Config {
            port,
            store_backend,
            state_dir,
            rng_seed,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join(DATABASE_FILE)
    }
}

/// Parse STORE_BACKEND, defaulting to SQLite when unset or blank.
pub fn parse_store_backend(value: Option<String>) -> Result<StoreBackend> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(StoreBackend::Sqlite),
        Some(v) if v.eq_ignore_ascii_case("sqlite") => Ok(StoreBackend::Sqlite),
        Some(v) if v.eq_ignore_ascii_case("memory") => Ok(StoreBackend::Memory),
        Some(other) => Err(anyhow!(
            "STORE_BACKEND must be 'sqlite' or 'memory', got '{}'",
            other
        )),
    }
}

/// Parse RNG_SEED. Missing or blank means no seed.
pub fn parse_rng_seed(value: Option<String>) -> Result<Option<u64>> {
    match value.filter(|s| !s.trim().is_empty()) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map(Some)
            .context("RNG_SEED must be an unsigned 64-bit integer"),
    }
}
