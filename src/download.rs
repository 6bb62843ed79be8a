//! Per-institution report downloads.
//!
//! Each institution's dashboard panel lists its reports as links inside
//! `div.col-md-3` blocks. The link's second-to-last path segment names the
//! report category, which decides the target folder and file name:
//!
//! ```text
//! https://…/public/uploads/peerteam_report/xyz.pdf
//!   → <reports.root>/Peer_Team_Report/<aishe_id>_peerteam_report.pdf
//! ```
//!
//! Institutions whose four files all exist are skipped without a request,
//! and individual files that exist are never refetched, so an interrupted
//! run can simply be restarted.

use anyhow::{anyhow, Result};
use scraper::{Html, Selector};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use knaack_core::models::{category_from_url, is_safe_aishe_id, ListingRecord, ReportKind};

use crate::config::{Config, ReportsConfig};
use crate::listing::{read_snapshot, SourceClient};
use crate::progress::{ProgressEvent, ProgressReporter, Stage};

/// Counters printed by `knaack download`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadStats {
    pub visited: u64,
    pub skipped: u64,
    pub files_written: u64,
    pub unknown_links: u64,
    pub failures: u64,
}

static REPORT_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.col-md-3 a[href]").expect("report link selector"));

/// Collect report links from the anchors inside `div.col-md-3` blocks.
///
/// Relative links are resolved against `base_url`. Duplicates keep their
/// first position.
pub fn extract_report_links(html: &str, base_url: &str) -> Vec<String> {
    let base = reqwest::Url::parse(&format!("{}/", base_url.trim_end_matches('/'))).ok();
    let document = Html::parse_document(html);

    let mut links = Vec::new();
    for anchor in document.select(&REPORT_LINK) {
        let Some(raw) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        if raw.is_empty() {
            continue;
        }
        let resolved = match &base {
            Some(b) => b
                .join(raw)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| raw.to_string()),
            None => raw.to_string(),
        };
        if !links.contains(&resolved) {
            links.push(resolved);
        }
    }

    links
}

/// True when all four report files for the institution exist.
pub fn all_reports_present(reports: &ReportsConfig, aishe_id: &str) -> bool {
    ReportKind::ALL
        .iter()
        .all(|kind| reports.path_for(*kind, aishe_id).exists())
}

async fn save_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = path.with_extension("pdf.part");
    tokio::fs::write(&partial, bytes).await?;
    tokio::fs::rename(&partial, path).await?;
    Ok(())
}

/// Download the reports of one institution. Returns `(written, unknown)`.
async fn download_institution(
    client: &SourceClient,
    reports: &ReportsConfig,
    hei_assessment_id: i64,
    aishe_id: &str,
) -> Result<(u64, u64)> {
    let html = client.fetch_institution_page(hei_assessment_id).await?;
    let links = extract_report_links(&html, client.base_url());

    let mut written = 0;
    let mut unknown = 0;
    for link in links {
        let Some(kind) = category_from_url(&link).and_then(ReportKind::from_category) else {
            eprintln!(
                "Warning: {}: skipping link with unknown report category: {}",
                aishe_id, link
            );
            unknown += 1;
            continue;
        };

        let path = reports.path_for(kind, aishe_id);
        if path.exists() {
            continue;
        }

        let bytes = client.fetch_bytes(&link).await?;
        save_file(&path, &bytes)
            .await
            .map_err(|e| anyhow!("failed to write {}: {}", path.display(), e))?;
        written += 1;
    }

    Ok((written, unknown))
}

/// Download reports for the given listing records, in order.
pub async fn download_reports(
    client: &SourceClient,
    reports: &ReportsConfig,
    records: &[ListingRecord],
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<DownloadStats> {
    let mut stats = DownloadStats::default();
    let records = &records[..limit.unwrap_or(records.len()).min(records.len())];
    let total = records.len() as u64;
    let delay = Duration::from_millis(client.config().request_delay_ms);

    for (i, record) in records.iter().enumerate() {
        let (Some(hei_id), Some(aishe_id)) = (record.hei_assessment_id, record.aishe_id.as_deref())
        else {
            eprintln!("Warning: listing record without hei_assessment_id or aishe_id; skipped");
            stats.skipped += 1;
            continue;
        };

        progress.report(ProgressEvent::Item {
            stage: Stage::Download,
            item: aishe_id.to_string(),
            n: i as u64 + 1,
            total,
        });

        // the id becomes part of a file name
        if !is_safe_aishe_id(aishe_id) {
            eprintln!("Warning: unsafe aishe_id {:?}; skipped", aishe_id);
            stats.failures += 1;
            continue;
        }

        if all_reports_present(reports, aishe_id) {
            stats.skipped += 1;
            continue;
        }

        stats.visited += 1;
        match download_institution(client, reports, hei_id, aishe_id).await {
            Ok((written, unknown)) => {
                stats.files_written += written;
                stats.unknown_links += unknown;
            }
            Err(e) => {
                eprintln!("Warning: {} (assessment {}): {:#}", aishe_id, hei_id, e);
                stats.failures += 1;
            }
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    Ok(stats)
}

/// `knaack download`.
pub async fn run_download(
    config: &Config,
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<DownloadStats> {
    let snapshot = read_snapshot(&config.source.snapshot)?;
    let records = snapshot.records();
    let client = SourceClient::new(&config.source)?;

    let stats = download_reports(&client, &config.reports, &records, limit, progress).await?;

    println!("download");
    println!("  institutions visited: {}", stats.visited);
    println!("  institutions skipped: {}", stats.skipped);
    println!("  files written: {}", stats.files_written);
    println!("  unknown links: {}", stats.unknown_links);
    println!("  failures: {}", stats.failures);
    Ok(stats)
}
