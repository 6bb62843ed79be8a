//! Grade-sheet PDFs → `criteria_wise_grades` / `key_indicators_grades`.
//!
//! Every `*.pdf` in the grade-sheet folder is read page by page, parsed by
//! [`knaack_core::gradesheet`], and written in one transaction per
//! institution that first deletes the institution's previous rows. A sheet
//! can be re-extracted any number of times without duplicating grades.

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

use knaack_core::gradesheet::{parse_grade_sheet, GradeSheet};
use knaack_core::models::{aishe_id_from_file_name, ReportKind};

use crate::config::Config;
use crate::db;
use crate::extract::extract_pdf_file;
use crate::migrate;
use crate::progress::{ProgressEvent, ProgressReporter, Stage};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GradeStats {
    pub files: u64,
    pub institutions: u64,
    pub criterion_rows: u64,
    pub indicator_rows: u64,
    pub empty: u64,
    pub failed: u64,
}

/// Replace one institution's grade rows.
pub async fn store_grade_sheet(pool: &SqlitePool, aishe_id: &str, sheet: &GradeSheet) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM criteria_wise_grades WHERE aishe_id = ?")
        .bind(aishe_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM key_indicators_grades WHERE aishe_id = ?")
        .bind(aishe_id)
        .execute(&mut *tx)
        .await?;

    for g in &sheet.criteria {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO criteria_wise_grades (
                aishe_id, criterion_no, weightage,
                criterion_wise_weighted_grade_point, criterion_wise_gpa
            ) VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(aishe_id)
        .bind(g.criterion_no)
        .bind(g.weightage)
        .bind(g.weighted_grade_point)
        .bind(g.gpa)
        .execute(&mut *tx)
        .await?;
    }

    for g in &sheet.indicators {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO key_indicators_grades (
                aishe_id, criterion_no, key_indicator_weightage, key_indicator_weighted_gpa
            ) VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(aishe_id)
        .bind(g.criterion_no)
        .bind(g.weightage)
        .bind(g.weighted_gpa)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// `*.pdf` files in a folder, sorted by name. A missing folder is empty.
pub fn pdf_files(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Extract and store grades from every sheet in the grade-sheet folder.
pub async fn extract_grades(
    pool: &SqlitePool,
    folder: &Path,
    progress: &dyn ProgressReporter,
) -> Result<GradeStats> {
    let files = pdf_files(folder)?;
    let total = files.len() as u64;
    let mut stats = GradeStats::default();

    for (i, path) in files.iter().enumerate() {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        stats.files += 1;

        progress.report(ProgressEvent::Item {
            stage: Stage::Grades,
            item: file_name.to_string(),
            n: i as u64 + 1,
            total,
        });

        let Some(aishe_id) = aishe_id_from_file_name(file_name) else {
            eprintln!("Warning: cannot derive AISHE ID from {}; skipped", file_name);
            stats.failed += 1;
            continue;
        };

        let pages = match extract_pdf_file(path) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Warning: {}: {}", path.display(), e);
                stats.failed += 1;
                continue;
            }
        };

        let sheet = parse_grade_sheet(aishe_id, &pages);
        if sheet.is_empty() {
            eprintln!("Warning: {}: no grade rows found", path.display());
            stats.empty += 1;
            continue;
        }

        store_grade_sheet(pool, aishe_id, &sheet).await?;
        stats.institutions += 1;
        stats.criterion_rows += sheet.criteria.len() as u64;
        stats.indicator_rows += sheet.indicators.len() as u64;
    }

    Ok(stats)
}

/// `knaack grades`.
pub async fn run_grades(config: &Config, progress: &dyn ProgressReporter) -> Result<GradeStats> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let folder = config.reports.folder(ReportKind::GradeSheet);
    let stats = extract_grades(&pool, &folder, progress).await?;
    pool.close().await;

    println!("grades");
    println!("  files: {}", stats.files);
    println!("  institutions stored: {}", stats.institutions);
    println!("  criterion rows: {}", stats.criterion_rows);
    println!("  key indicator rows: {}", stats.indicator_rows);
    println!("  without grade rows: {}", stats.empty);
    println!("  failed: {}", stats.failed);
    Ok(stats)
}
