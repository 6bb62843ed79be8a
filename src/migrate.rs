//! Database schema creation.
//!
//! Two groups of tables live in one SQLite file:
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `institution_details` | One row per listing record, keyed by `hei_assessment_id` |
//! | `criteria_key_indicators` | The static criteria / key-indicator taxonomy |
//! | `criteria_wise_grades` | Per-institution, per-criterion grades |
//! | `key_indicators_grades` | Per-institution, per-indicator grades |
//! | `reports` | Indexed peer-team reports |
//! | `chunks` / `chunks_fts` | Report text chunks and their FTS5 index |
//! | `embeddings` / `chunk_vectors` | Embedding metadata and vector BLOBs |
//!
//! The first four are what the SQL agent sees. Every statement is
//! idempotent, and the taxonomy seed uses `INSERT OR IGNORE`, so `init`
//! can be run any number of times.

use anyhow::Result;
use sqlx::SqlitePool;

use knaack_core::taxonomy;

use crate::config::Config;
use crate::db;

/// Tables exposed to the SQL agent.
pub const ACCREDITATION_TABLES: [&str; 4] = [
    "institution_details",
    "criteria_key_indicators",
    "criteria_wise_grades",
    "key_indicators_grades",
];

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS institution_details (
        hei_assessment_id INTEGER PRIMARY KEY,
        hei_name TEXT,
        aishe_id TEXT,
        other_address TEXT,
        state_name TEXT,
        iiqa_submitted_date TEXT,
        date_of_declaration TEXT,
        grade TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_institution_details_aishe ON institution_details(aishe_id)",
    r#"
    CREATE TABLE IF NOT EXISTS criteria_key_indicators (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        criterion TEXT NOT NULL,
        criterion_no REAL NOT NULL UNIQUE,
        key_indicator TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS criteria_wise_grades (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        aishe_id TEXT NOT NULL,
        criterion_no REAL NOT NULL,
        weightage REAL,
        criterion_wise_weighted_grade_point REAL,
        criterion_wise_gpa REAL,
        UNIQUE(aishe_id, criterion_no)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS key_indicators_grades (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        aishe_id TEXT NOT NULL,
        criterion_no REAL NOT NULL,
        key_indicator_weightage REAL,
        key_indicator_weighted_gpa REAL,
        UNIQUE(aishe_id, criterion_no)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reports (
        id TEXT PRIMARY KEY,
        aishe_id TEXT NOT NULL UNIQUE,
        college_name TEXT,
        source_path TEXT NOT NULL,
        page_count INTEGER NOT NULL,
        content_hash TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chunks (
        id TEXT PRIMARY KEY,
        report_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        page INTEGER NOT NULL,
        text TEXT NOT NULL,
        hash TEXT NOT NULL,
        UNIQUE(report_id, chunk_index),
        FOREIGN KEY (report_id) REFERENCES reports(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chunks_report_id ON chunks(report_id)",
    r#"
    CREATE TABLE IF NOT EXISTS embeddings (
        chunk_id TEXT PRIMARY KEY,
        model TEXT NOT NULL,
        dims INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        hash TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chunk_vectors (
        chunk_id TEXT PRIMARY KEY,
        report_id TEXT NOT NULL,
        embedding BLOB NOT NULL
    )
    "#,
];

/// Create every table on an open pool and seed the taxonomy.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    // FTS5 has no IF NOT EXISTS
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                report_id UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    seed_taxonomy(pool).await?;
    Ok(())
}

/// Insert the taxonomy rows that are not already present. Returns the
/// number of rows inserted.
pub async fn seed_taxonomy(pool: &SqlitePool) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for entry in taxonomy::entries() {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO criteria_key_indicators (criterion, criterion_no, key_indicator)
             VALUES (?, ?, ?)",
        )
        .bind(entry.criterion)
        .bind(entry.number)
        .bind(entry.key_indicator)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}
