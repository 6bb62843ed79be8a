//! Peer-team reports → searchable chunks.
//!
//! For every `<aishe_id>_peerteam_report.pdf` in the peer-team folder:
//!
//! 1. Hash the file; skip it when the same AISHE ID is already indexed with
//!    the same hash (unless `--full`).
//! 2. Resolve the college name from `institution_details`.
//! 3. Extract pages, upsert the `reports` row, replace its chunks.
//! 4. Embed the new chunks when a provider is enabled. Failures leave the
//!    chunks pending for `knaack embed pending`.

use anyhow::Result;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::Path;

use knaack_core::chunk::chunk_pages;
use knaack_core::models::{aishe_id_from_file_name, Report, ReportKind};
use knaack_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embed_cmd::embed_chunks_inline;
use crate::embedding::{self, EmbeddingProvider};
use crate::extract::extract_pdf_file;
use crate::grades::pdf_files;
use crate::loader::institution_name;
use crate::migrate;
use crate::progress::{ProgressEvent, ProgressReporter, Stage};
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub files: u64,
    pub indexed: u64,
    pub unchanged: u64,
    pub failed: u64,
    pub chunks: u64,
    pub embedded: u64,
    pub embeddings_pending: u64,
}

/// One report, already read, ready to index.
pub struct ReportInput<'a> {
    pub aishe_id: &'a str,
    pub college_name: Option<String>,
    pub source_path: &'a str,
    pub content_hash: &'a str,
    pub pages: &'a [String],
}

/// Upsert a report and replace its chunks. Returns `(chunks, embedded, pending)`.
pub async fn index_pages(
    config: &Config,
    store: &dyn Store,
    provider: Option<&dyn EmbeddingProvider>,
    input: ReportInput<'_>,
) -> Result<(u64, u64, u64)> {
    // the hash is written only once the chunks are in, so a failed chunk
    // write is retried by the next run instead of counted as unchanged
    let mut report = Report {
        id: uuid::Uuid::new_v4().to_string(),
        aishe_id: input.aishe_id.to_string(),
        college_name: input.college_name,
        source_path: input.source_path.to_string(),
        page_count: input.pages.len() as i64,
        content_hash: String::new(),
        updated_at: chrono::Utc::now().timestamp(),
    };
    let report_id = store.upsert_report(&report).await?;

    let chunks = chunk_pages(
        &report_id,
        input.pages,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    );
    store.replace_chunks(&report_id, &chunks, None).await?;

    report.id = report_id.clone();
    report.content_hash = input.content_hash.to_string();
    store.upsert_report(&report).await?;

    let (embedded, pending) = match provider {
        Some(p) => embed_chunks_inline(config, p, store, &chunks).await,
        None => (0, 0),
    };

    Ok((chunks.len() as u64, embedded, pending))
}

fn file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Index the peer-team reports in `folder`.
pub async fn index_reports(
    config: &Config,
    pool: &SqlitePool,
    folder: &Path,
    limit: Option<usize>,
    full: bool,
    progress: &dyn ProgressReporter,
) -> Result<IndexStats> {
    let store = SqliteStore::new(pool.clone());
    let provider = if config.embedding.is_enabled() {
        match embedding::create_provider(&config.embedding) {
            Ok(p) => Some(p),
            Err(e) => {
                eprintln!("Warning: could not create embedding provider: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let suffix = format!("_{}.pdf", ReportKind::PeerTeam.category());
    let mut files: Vec<_> = pdf_files(folder)?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(&suffix))
                .unwrap_or(false)
        })
        .collect();
    if let Some(l) = limit {
        files.truncate(l);
    }
    let total = files.len() as u64;
    let mut stats = IndexStats::default();

    for (i, path) in files.iter().enumerate() {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        stats.files += 1;

        progress.report(ProgressEvent::Item {
            stage: Stage::Index,
            item: file_name.to_string(),
            n: i as u64 + 1,
            total,
        });

        let Some(aishe_id) = aishe_id_from_file_name(file_name) else {
            eprintln!("Warning: cannot derive AISHE ID from {}; skipped", file_name);
            stats.failed += 1;
            continue;
        };

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("Warning: {}: {}", path.display(), e);
                stats.failed += 1;
                continue;
            }
        };
        let hash = file_hash(&bytes);

        if !full {
            if let Some(existing) = store.find_report(aishe_id).await? {
                if existing.content_hash == hash {
                    stats.unchanged += 1;
                    continue;
                }
            }
        }

        let pages = match extract_pdf_file(path) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Warning: {}: {}", path.display(), e);
                stats.failed += 1;
                continue;
            }
        };

        let college_name = institution_name(pool, aishe_id).await?;
        if college_name.is_none() {
            eprintln!(
                "Warning: {}: no institution_details row; indexed without a college name",
                aishe_id
            );
        }

        let source_path = path.display().to_string();
        let (chunks, embedded, pending) = index_pages(
            config,
            &store,
            provider.as_deref(),
            ReportInput {
                aishe_id,
                college_name,
                source_path: &source_path,
                content_hash: &hash,
                pages: &pages,
            },
        )
        .await?;

        stats.indexed += 1;
        stats.chunks += chunks;
        stats.embedded += embedded;
        stats.embeddings_pending += pending;
    }

    Ok(stats)
}

/// `knaack index`.
pub async fn run_index(
    config: &Config,
    limit: Option<usize>,
    full: bool,
    progress: &dyn ProgressReporter,
) -> Result<IndexStats> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let folder = config.reports.folder(ReportKind::PeerTeam);
    let stats = index_reports(config, &pool, &folder, limit, full, progress).await?;
    pool.close().await;

    println!("index");
    println!("  report files: {}", stats.files);
    println!("  indexed: {}", stats.indexed);
    println!("  unchanged: {}", stats.unchanged);
    println!("  failed: {}", stats.failed);
    println!("  chunks written: {}", stats.chunks);
    if config.embedding.is_enabled() {
        println!("  embedded: {}", stats.embedded);
        println!("  embeddings pending: {}", stats.embeddings_pending);
    }
    Ok(stats)
}
