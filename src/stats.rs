//! Database statistics.
//!
//! A quick summary of what each pipeline stage has produced: institutions
//! loaded, grade rows extracted, reports indexed, embedding coverage, and
//! a per-state breakdown of the listing. Used by `knaack stats`.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Counts {
    pub institutions: i64,
    pub taxonomy: i64,
    pub graded_institutions: i64,
    pub criterion_rows: i64,
    pub indicator_rows: i64,
    pub reports: i64,
    pub reports_without_college: i64,
    pub chunks: i64,
    pub embedded: i64,
    pub last_indexed: Option<i64>,
}

async fn count(pool: &SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).fetch_one(pool).await?)
}

pub async fn collect_counts(pool: &SqlitePool) -> Result<Counts> {
    Ok(Counts {
        institutions: count(pool, "SELECT COUNT(*) FROM institution_details").await?,
        taxonomy: count(pool, "SELECT COUNT(*) FROM criteria_key_indicators").await?,
        graded_institutions: count(
            pool,
            "SELECT COUNT(DISTINCT aishe_id) FROM criteria_wise_grades",
        )
        .await?,
        criterion_rows: count(pool, "SELECT COUNT(*) FROM criteria_wise_grades").await?,
        indicator_rows: count(pool, "SELECT COUNT(*) FROM key_indicators_grades").await?,
        reports: count(pool, "SELECT COUNT(*) FROM reports").await?,
        reports_without_college: count(
            pool,
            "SELECT COUNT(*) FROM reports WHERE college_name IS NULL",
        )
        .await?,
        chunks: count(pool, "SELECT COUNT(*) FROM chunks").await?,
        embedded: count(pool, "SELECT COUNT(*) FROM chunk_vectors").await?,
        last_indexed: sqlx::query_scalar("SELECT MAX(updated_at) FROM reports")
            .fetch_one(pool)
            .await?,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    crate::migrate::migrate_pool(&pool).await?;
    let c = collect_counts(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("KNAACK Database Stats");
    println!("=====================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Institutions:  {}", c.institutions);
    println!("  Taxonomy rows: {}", c.taxonomy);
    println!(
        "  Graded:        {} institutions ({} criterion rows, {} indicator rows)",
        c.graded_institutions, c.criterion_rows, c.indicator_rows
    );
    println!(
        "  Reports:       {} ({} without college name)",
        c.reports, c.reports_without_college
    );
    println!("  Chunks:        {}", c.chunks);
    println!(
        "  Embedded:      {} / {} ({}%)",
        c.embedded,
        c.chunks,
        if c.chunks > 0 {
            (c.embedded * 100) / c.chunks
        } else {
            0
        }
    );
    println!(
        "  Last indexed:  {}",
        c.last_indexed
            .map(format_ts_iso)
            .unwrap_or_else(|| "never".to_string())
    );

    let state_rows = sqlx::query(
        r#"
        SELECT COALESCE(state_name, '(unknown)') AS state, COUNT(*) AS n
        FROM institution_details
        GROUP BY state
        ORDER BY n DESC, state
        LIMIT 10
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !state_rows.is_empty() {
        println!();
        println!("  Top states:");
        println!("  {:<32} {:>8}", "STATE", "HEIs");
        println!("  {}", "-".repeat(41));
        for row in &state_rows {
            let state: String = row.get("state");
            let n: i64 = row.get("n");
            println!("  {:<32} {:>8}", state, n);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
