//! Listing snapshot → `institution_details`.
//!
//! Records are upserted by `hei_assessment_id`, so loading the same (or a
//! newer) snapshot twice leaves one row per assessment.

use anyhow::Result;
use sqlx::SqlitePool;

use knaack_core::models::ListingRecord;

use crate::config::Config;
use crate::db;
use crate::listing::read_snapshot;
use crate::migrate;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub upserted: u64,
    pub skipped: u64,
}

/// Upsert listing records in one transaction.
pub async fn load_records(pool: &SqlitePool, records: &[ListingRecord]) -> Result<LoadStats> {
    let mut stats = LoadStats::default();
    let mut tx = pool.begin().await?;

    for record in records {
        let Some(id) = record.hei_assessment_id else {
            stats.skipped += 1;
            continue;
        };

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO institution_details (
                hei_assessment_id, hei_name, aishe_id, other_address, state_name,
                iiqa_submitted_date, date_of_declaration, grade
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&record.hei_name)
        .bind(&record.aishe_id)
        .bind(&record.other_address)
        .bind(&record.state_name)
        .bind(&record.iiqa_submitted_date)
        .bind(&record.date_of_declaration)
        .bind(&record.grade)
        .execute(&mut *tx)
        .await?;
        stats.upserted += 1;
    }

    tx.commit().await?;
    Ok(stats)
}

/// Institution name for an AISHE ID, if the listing has been loaded.
pub async fn institution_name(pool: &SqlitePool, aishe_id: &str) -> Result<Option<String>> {
    let name: Option<Option<String>> = sqlx::query_scalar(
        "SELECT hei_name FROM institution_details WHERE aishe_id = ? ORDER BY hei_assessment_id DESC LIMIT 1",
    )
    .bind(aishe_id)
    .fetch_optional(pool)
    .await?;
    Ok(name.flatten())
}

/// `knaack load`.
pub async fn run_load(config: &Config) -> Result<LoadStats> {
    let snapshot = read_snapshot(&config.source.snapshot)?;
    let records = snapshot.records();

    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let stats = load_records(&pool, &records).await?;
    pool.close().await;

    if stats.skipped > 0 {
        eprintln!(
            "Warning: {} listing records had no hei_assessment_id and were skipped",
            stats.skipped
        );
    }

    println!("load");
    println!("  snapshot records: {}", snapshot.data.len());
    println!("  upserted: {}", stats.upserted);
    println!("  skipped: {}", stats.skipped);
    Ok(stats)
}
