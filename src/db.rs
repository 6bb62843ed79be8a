//! SQLite connection management.
//!
//! [`connect`] opens the read-write pool used by the pipeline commands,
//! creating the database file and its directory on first use, with WAL
//! journaling so the server can answer questions while `sync` writes.
//!
//! [`connect_read_only`] opens a separate pool for model-written SQL: the
//! connection itself refuses writes, so a statement that slips past the
//! agent tool's shape check still cannot modify data.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    Ok(pool)
}

/// Open the database read-only. The file must already exist (run `init`).
pub async fn connect_read_only(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .with_context(|| {
            format!(
                "Failed to open database read-only: {} (run `knaack init` first)",
                db_path.display()
            )
        })?;

    Ok(pool)
}
