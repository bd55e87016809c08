// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, migrations
//! and schema capability detection.
//!
//! All statements are serialized through tokio-rusqlite's single background
//! thread. Every store operation is one `call` closure, which makes it atomic
//! with respect to every other operation on the same database.

use std::time::Duration;

use concierge_config::model::StorageConfig;
use concierge_core::ConciergeError;
use concierge_core::types::StoreCapabilities;
use rusqlite::params;
use tracing::{debug, info, warn};

/// How long a statement waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Options controlling how a database file is prepared on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    pub wal_mode: bool,
    pub run_migrations: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            wal_mode: true,
            run_migrations: true,
        }
    }
}

impl From<&StorageConfig> for OpenOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            wal_mode: config.wal_mode,
            run_migrations: config.run_migrations,
        }
    }
}

/// An open SQLite database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
    capabilities: StoreCapabilities,
}

impl Database {
    /// Open (or create) the database at `path` with default options.
    pub async fn open(path: &str) -> Result<Self, ConciergeError> {
        Self::open_with(path, OpenOptions::default()).await
    }

    /// Open the database, apply PRAGMAs and pending migrations, then detect
    /// which optional schema features are present.
    pub async fn open_with(path: &str, options: OpenOptions) -> Result<Self, ConciergeError> {
        let setup_path = path.to_string();
        let capabilities = tokio::task::spawn_blocking(move || prepare(&setup_path, options))
            .await
            .map_err(|e| ConciergeError::Internal(format!("database setup task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| ConciergeError::StoreUnavailable {
                source: Box::new(e),
            })?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        info!(
            path,
            unsend = capabilities.unsend,
            participants = capabilities.participants,
            scheduling = capabilities.scheduling,
            "database opened"
        );
        Ok(Self { conn, capabilities })
    }

    /// The connection every query runs through.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Schema features detected at open time.
    pub fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    /// Flush the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), ConciergeError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Rows reported by `PRAGMA integrity_check`; a healthy file yields `["ok"]`.
    pub async fn integrity_check(&self) -> Result<Vec<String>, ConciergeError> {
        self.conn
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare("PRAGMA integrity_check")?;
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>();
                rows
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), ConciergeError> {
        self.checkpoint().await?;
        self.conn
            .close()
            .await
            .map_err(|e| ConciergeError::StoreUnavailable {
                source: Box::new(e),
            })
    }
}

/// Synchronous setup on a plain connection: journal mode, migrations and
/// capability detection.
fn prepare(path: &str, options: OpenOptions) -> Result<StoreCapabilities, ConciergeError> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ConciergeError::StoreUnavailable {
                source: Box::new(e),
            })?;
        }
    }

    let mut conn = rusqlite::Connection::open(path).map_err(store_err)?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(store_err)?;
    if options.wal_mode {
        let mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(store_err)?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!(path, mode = %mode, "WAL mode unavailable, continuing with current journal mode");
        }
    }

    if options.run_migrations {
        crate::migrations::run_migrations(&mut conn)?;
    }

    detect_capabilities(&conn).map_err(store_err)
}

/// Inspect the schema once and report which optional features it supports.
pub(crate) fn detect_capabilities(
    conn: &rusqlite::Connection,
) -> Result<StoreCapabilities, rusqlite::Error> {
    let has_column = |table: &str, column: &str| -> Result<bool, rusqlite::Error> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
            params![table, column],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    };

    Ok(StoreCapabilities {
        unsend: has_column("messages", "is_unsent")?
            && has_column("messages", "unsent_at")?
            && has_column("messages", "unsent_by")?,
        participants: has_column("participants", "last_read_at")?,
        scheduling: has_column("scheduled_messages", "locked_until")?
            && has_column("scheduled_messages", "claimed_by")?,
    })
}

fn store_err(e: rusqlite::Error) -> ConciergeError {
    ConciergeError::StoreUnavailable {
        source: Box::new(e),
    }
}

/// Convert a tokio-rusqlite error into [`ConciergeError::StoreUnavailable`].
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> ConciergeError {
    ConciergeError::StoreUnavailable {
        source: Box::new(e),
    }
}

/// Error for operations whose tables the detected schema does not have.
pub(crate) fn unsupported(feature: &str) -> ConciergeError {
    ConciergeError::Config(format!(
        "the store schema does not support {feature}; run migrations to enable it"
    ))
}
