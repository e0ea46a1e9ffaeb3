//! SQLite implementation of the entity store.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Atomicity
//!
//! Every multi-row write (team with members, pull request with reviewers,
//! reviewer replacement) runs in a single transaction. Uniqueness of team
//! names and pull request ids is enforced by primary keys, so a racing
//! duplicate insert surfaces as `RepositoryError::AlreadyExists`.


use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use assigner_core::{
    AssignmentStats, EntityKind, PrStatus, PullRequest, PullRequestId, PullRequestRepository,
    PullRequestShort, RepositoryError, Team, TeamMember, TeamRepository, User, UserId,
    UserRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed entity store.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Create a new SQLite repository at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    /// Runs any pending migrations if the database exists but has an older schema.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for better concurrency and crash safety
    /// - `synchronous = FULL` for maximum durability
    /// - `busy_timeout = 5000ms` to handle concurrent access gracefully
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();

        // Ensure parent directory exists (unless it's :memory: or empty path)
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";
        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // SQLite can silently keep DELETE mode on filesystems without shared
        // memory support. In-memory databases report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // 0 if table is empty = fresh database
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS teams (
                    team_name TEXT PRIMARY KEY
                );

                CREATE TABLE IF NOT EXISTS users (
                    user_id TEXT PRIMARY KEY,
                    username TEXT NOT NULL,
                    team_name TEXT NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1
                );

                CREATE INDEX IF NOT EXISTS idx_users_team_active
                    ON users(team_name, is_active);

                CREATE TABLE IF NOT EXISTS pull_requests (
                    pull_request_id TEXT PRIMARY KEY,
                    pull_request_name TEXT NOT NULL,
                    author_id TEXT NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('OPEN', 'MERGED')),
                    created_at TEXT NOT NULL,
                    merged_at TEXT
                );

                CREATE TABLE IF NOT EXISTS pr_reviewers (
                    pull_request_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    PRIMARY KEY (pull_request_id, user_id)
                );

                CREATE INDEX IF NOT EXISTS idx_pr_reviewers_user
                    ON pr_reviewers(user_id);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

// =============================================================================
// Conversion helpers
// =============================================================================

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn timestamp_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn timestamp_from_sql(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| RepositoryError::corruption("timestamp"))
}

fn status_from_sql(value: &str) -> Result<PrStatus, RepositoryError> {
    value
        .parse()
        .map_err(|_| RepositoryError::corruption("pull request status"))
}

/// Load a pull request and its ordered reviewers.
fn read_pull_request(
    conn: &Connection,
    id: &str,
    operation: &'static str,
) -> Result<Option<PullRequest>, RepositoryError> {
    let row: Option<(String, String, String, String, Option<String>)> = conn
        .query_row(
            "SELECT pull_request_name, author_id, status, created_at, merged_at
             FROM pull_requests WHERE pull_request_id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .optional()
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;

    let Some((name, author_id, status, created_at, merged_at)) = row else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            "SELECT user_id FROM pr_reviewers
             WHERE pull_request_id = ?1 ORDER BY position",
        )
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;
    let reviewers = stmt
        .query_map(params![id], |row| row.get::<_, String>(0))
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
        .map(|r| r.map(UserId::from))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;

    Ok(Some(PullRequest {
        id: PullRequestId::from(id),
        name,
        author_id: UserId::from(author_id),
        status: status_from_sql(&status)?,
        assigned_reviewers: reviewers,
        created_at: timestamp_from_sql(&created_at)?,
        merged_at: merged_at.as_deref().map(timestamp_from_sql).transpose()?,
    }))
}

fn insert_reviewers(
    tx: &Transaction<'_>,
    id: &str,
    reviewers: &[String],
    operation: &'static str,
) -> Result<(), RepositoryError> {
    let mut stmt = tx
        .prepare(
            "INSERT INTO pr_reviewers (pull_request_id, user_id, position)
             VALUES (?1, ?2, ?3)",
        )
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;
    for (position, reviewer) in reviewers.iter().enumerate() {
        stmt.execute(params![id, reviewer, position as i64])
            .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;
    }
    Ok(())
}

// =============================================================================
// Store trait implementations
// =============================================================================

#[async_trait]
impl TeamRepository for SqliteRepository {
    async fn create_team(&self, team: &Team) -> Result<(), RepositoryError> {
        let team = team.clone();

        self.with_conn("create_team", move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("create_team", e.to_string()))?;

            tx.execute(
                "INSERT INTO teams (team_name) VALUES (?1)",
                params![team.name],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepositoryError::already_exists(EntityKind::Team, team.name.clone())
                } else {
                    RepositoryError::storage("create_team", e.to_string())
                }
            })?;

            for member in &team.members {
                tx.execute(
                    "INSERT INTO users (user_id, username, team_name, is_active)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(user_id) DO UPDATE SET
                         username = excluded.username,
                         team_name = excluded.team_name,
                         is_active = excluded.is_active",
                    params![
                        member.user_id.as_str(),
                        member.username,
                        team.name,
                        member.is_active
                    ],
                )
                .map_err(|e| RepositoryError::storage("create_team", e.to_string()))?;
            }

            tx.commit()
                .map_err(|e| RepositoryError::storage("create_team", e.to_string()))
        })
        .await
    }

    async fn get_team(&self, name: &str) -> Result<Option<Team>, RepositoryError> {
        let name = name.to_string();

        self.with_conn("get_team", move |conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM teams WHERE team_name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get_team", e.to_string()))?;
            if exists.is_none() {
                return Ok(None);
            }

            let mut stmt = conn
                .prepare(
                    "SELECT user_id, username, is_active FROM users
                     WHERE team_name = ?1 ORDER BY user_id",
                )
                .map_err(|e| RepositoryError::storage("get_team", e.to_string()))?;
            let members = stmt
                .query_map(params![name], |row| {
                    Ok(TeamMember {
                        user_id: UserId::from(row.get::<_, String>(0)?),
                        username: row.get(1)?,
                        is_active: row.get(2)?,
                    })
                })
                .map_err(|e| RepositoryError::storage("get_team", e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RepositoryError::storage("get_team", e.to_string()))?;

            Ok(Some(Team { name, members }))
        })
        .await
    }

    async fn team_exists(&self, name: &str) -> Result<bool, RepositoryError> {
        let name = name.to_string();

        self.with_conn("team_exists", move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM teams WHERE team_name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .map_err(|e| RepositoryError::storage("team_exists", e.to_string()))?;
            Ok(count > 0)
        })
        .await
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::from(row.get::<_, String>(0)?),
        username: row.get(1)?,
        team_name: row.get(2)?,
        is_active: row.get(3)?,
    })
}

#[async_trait]
impl UserRepository for SqliteRepository {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let id = id.0.clone();

        self.with_conn("get_user", move |conn| {
            conn.query_row(
                "SELECT user_id, username, team_name, is_active FROM users WHERE user_id = ?1",
                params![id],
                user_from_row,
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get_user", e.to_string()))
        })
        .await
    }

    async fn set_user_active(
        &self,
        id: &UserId,
        is_active: bool,
    ) -> Result<User, RepositoryError> {
        let id = id.0.clone();

        self.with_conn("set_user_active", move |conn| {
            // RETURNING keeps the update and the read in one statement
            conn.query_row(
                "UPDATE users SET is_active = ?2 WHERE user_id = ?1
                 RETURNING user_id, username, team_name, is_active",
                params![id, is_active],
                user_from_row,
            )
            .optional()
            .map_err(|e| RepositoryError::storage("set_user_active", e.to_string()))?
            .ok_or_else(|| RepositoryError::not_found(EntityKind::User, id))
        })
        .await
    }

    async fn list_active_by_team(
        &self,
        team_name: &str,
        exclude: &UserId,
    ) -> Result<Vec<User>, RepositoryError> {
        let team_name = team_name.to_string();
        let exclude = exclude.0.clone();

        self.with_conn("list_active_by_team", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, username, team_name, is_active FROM users
                     WHERE team_name = ?1 AND is_active = 1 AND user_id != ?2
                     ORDER BY user_id",
                )
                .map_err(|e| RepositoryError::storage("list_active_by_team", e.to_string()))?;
            let users = stmt
                .query_map(params![team_name, exclude], user_from_row)
                .map_err(|e| RepositoryError::storage("list_active_by_team", e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RepositoryError::storage("list_active_by_team", e.to_string()))?;
            Ok(users)
        })
        .await
    }
}

#[async_trait]
impl PullRequestRepository for SqliteRepository {
    async fn create_pull_request(&self, pr: &PullRequest) -> Result<(), RepositoryError> {
        let id = pr.id.0.clone();
        let name = pr.name.clone();
        let author_id = pr.author_id.0.clone();
        let status = pr.status.as_str();
        let created_at = timestamp_to_sql(&pr.created_at);
        let merged_at = pr.merged_at.as_ref().map(timestamp_to_sql);
        let reviewers: Vec<String> = pr.assigned_reviewers.iter().map(|r| r.0.clone()).collect();

        self.with_conn("create_pull_request", move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("create_pull_request", e.to_string()))?;

            tx.execute(
                "INSERT INTO pull_requests
                     (pull_request_id, pull_request_name, author_id, status, created_at, merged_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, name, author_id, status, created_at, merged_at],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepositoryError::already_exists(EntityKind::PullRequest, id.clone())
                } else {
                    RepositoryError::storage("create_pull_request", e.to_string())
                }
            })?;

            insert_reviewers(&tx, &id, &reviewers, "create_pull_request")?;

            tx.commit()
                .map_err(|e| RepositoryError::storage("create_pull_request", e.to_string()))
        })
        .await
    }

    async fn get_pull_request(
        &self,
        id: &PullRequestId,
    ) -> Result<Option<PullRequest>, RepositoryError> {
        let id = id.0.clone();
        self.with_conn("get_pull_request", move |conn| {
            read_pull_request(conn, &id, "get_pull_request")
        })
        .await
    }

    async fn update_status(
        &self,
        id: &PullRequestId,
        status: PrStatus,
        merged_at: Option<DateTime<Utc>>,
    ) -> Result<PullRequest, RepositoryError> {
        let id = id.0.clone();
        let merged_at = merged_at.as_ref().map(timestamp_to_sql);

        self.with_conn("update_status", move |conn| {
            let changed = conn
                .execute(
                    "UPDATE pull_requests SET status = ?2, merged_at = ?3
                     WHERE pull_request_id = ?1",
                    params![id, status.as_str(), merged_at],
                )
                .map_err(|e| RepositoryError::storage("update_status", e.to_string()))?;
            if changed == 0 {
                return Err(RepositoryError::not_found(EntityKind::PullRequest, id));
            }

            read_pull_request(conn, &id, "update_status")?
                .ok_or_else(|| RepositoryError::not_found(EntityKind::PullRequest, id))
        })
        .await
    }

    async fn update_reviewers(
        &self,
        id: &PullRequestId,
        reviewers: &[UserId],
    ) -> Result<(), RepositoryError> {
        let id = id.0.clone();
        let reviewers: Vec<String> = reviewers.iter().map(|r| r.0.clone()).collect();

        self.with_conn("update_reviewers", move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("update_reviewers", e.to_string()))?;

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM pull_requests WHERE pull_request_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| RepositoryError::storage("update_reviewers", e.to_string()))?;
            if exists.is_none() {
                return Err(RepositoryError::not_found(EntityKind::PullRequest, id));
            }

            tx.execute(
                "DELETE FROM pr_reviewers WHERE pull_request_id = ?1",
                params![id],
            )
            .map_err(|e| RepositoryError::storage("update_reviewers", e.to_string()))?;
            insert_reviewers(&tx, &id, &reviewers, "update_reviewers")?;

            tx.commit()
                .map_err(|e| RepositoryError::storage("update_reviewers", e.to_string()))
        })
        .await
    }

    async fn list_by_reviewer(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PullRequestShort>, RepositoryError> {
        let user_id = user_id.0.clone();

        self.with_conn("list_by_reviewer", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT pr.pull_request_id, pr.pull_request_name, pr.author_id, pr.status
                     FROM pull_requests pr
                     JOIN pr_reviewers r ON r.pull_request_id = pr.pull_request_id
                     WHERE r.user_id = ?1
                     ORDER BY pr.pull_request_id",
                )
                .map_err(|e| RepositoryError::storage("list_by_reviewer", e.to_string()))?;
            let rows = stmt
                .query_map(params![user_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(|e| RepositoryError::storage("list_by_reviewer", e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RepositoryError::storage("list_by_reviewer", e.to_string()))?;

            rows.into_iter()
                .map(|(id, name, author_id, status)| {
                    Ok(PullRequestShort {
                        id: PullRequestId::from(id),
                        name,
                        author_id: UserId::from(author_id),
                        status: status_from_sql(&status)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn pull_request_exists(&self, id: &PullRequestId) -> Result<bool, RepositoryError> {
        let id = id.0.clone();

        self.with_conn("pull_request_exists", move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM pull_requests WHERE pull_request_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .map_err(|e| RepositoryError::storage("pull_request_exists", e.to_string()))?;
            Ok(count > 0)
        })
        .await
    }

    async fn aggregate_stats(&self) -> Result<AssignmentStats, RepositoryError> {
        self.with_conn("aggregate_stats", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT pr.pull_request_id, r.user_id
                     FROM pull_requests pr
                     LEFT JOIN pr_reviewers r ON r.pull_request_id = pr.pull_request_id",
                )
                .map_err(|e| RepositoryError::storage("aggregate_stats", e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
                })
                .map_err(|e| RepositoryError::storage("aggregate_stats", e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RepositoryError::storage("aggregate_stats", e.to_string()))?;

            let mut lists: BTreeMap<PullRequestId, Vec<UserId>> = BTreeMap::new();
            for (pr_id, reviewer) in rows {
                let reviewers = lists.entry(PullRequestId::from(pr_id)).or_default();
                if let Some(reviewer) = reviewer {
                    reviewers.push(UserId::from(reviewer));
                }
            }

            Ok(AssignmentStats::from_reviewer_lists(
                lists.iter().map(|(id, reviewers)| (id, reviewers.as_slice())),
            ))
        })
        .await
    }
}
