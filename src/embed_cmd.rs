//! `knaack embed pending|rebuild` and the inline embedding step of `index`.
//!
//! A chunk is pending when it has no row in `embeddings` for the current
//! model, or when the stored hash differs from the chunk's text hash.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use knaack_core::models::Chunk;
use knaack_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::progress::{ProgressEvent, ProgressReporter, Stage};
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone)]
pub struct PendingChunk {
    pub chunk_id: String,
    pub report_id: String,
    pub text: String,
    pub hash: String,
}

/// Chunks with a missing or stale embedding for `model`, in index order.
pub async fn find_pending_chunks(
    pool: &SqlitePool,
    model: &str,
    limit: Option<usize>,
) -> Result<Vec<PendingChunk>> {
    let limit_val = limit.map(|l| l as i64).unwrap_or(i64::MAX);

    let rows = sqlx::query(
        r#"
        SELECT c.id AS chunk_id, c.report_id, c.text, c.hash
        FROM chunks c
        LEFT JOIN embeddings e ON e.chunk_id = c.id AND e.model = ?
        WHERE e.chunk_id IS NULL OR e.hash != c.hash
        ORDER BY c.report_id, c.chunk_index
        LIMIT ?
        "#,
    )
    .bind(model)
    .bind(limit_val)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| PendingChunk {
            chunk_id: row.get("chunk_id"),
            report_id: row.get("report_id"),
            text: row.get("text"),
            hash: row.get("hash"),
        })
        .collect())
}

/// Embed `items` in batches and store the vectors. A failed batch is
/// counted and skipped. Returns `(embedded, failed)`.
pub async fn embed_batches(
    config: &Config,
    provider: &dyn EmbeddingProvider,
    store: &dyn Store,
    items: &[PendingChunk],
    progress: &dyn ProgressReporter,
) -> Result<(u64, u64)> {
    let model_name = provider.model_name().to_string();
    let total = items.len() as u64;
    let mut embedded = 0u64;
    let mut failed = 0u64;

    for batch in items.chunks(config.embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();

        match embedding::embed_texts(provider, &config.embedding, &texts).await {
            Ok(vectors) => {
                for (item, vec) in batch.iter().zip(vectors.iter()) {
                    store
                        .upsert_embedding(
                            &item.chunk_id,
                            &item.report_id,
                            vec,
                            &model_name,
                            provider.dims(),
                            &item.hash,
                        )
                        .await?;
                    embedded += 1;
                }
            }
            Err(e) => {
                eprintln!("Warning: embedding batch failed: {:#}", e);
                failed += batch.len() as u64;
            }
        }

        progress.report(ProgressEvent::Item {
            stage: Stage::Embed,
            item: format!("{} chunks", embedded + failed),
            n: embedded + failed,
            total,
        });
    }

    Ok((embedded, failed))
}

/// Embed freshly indexed chunks. Never fails: problems leave the chunks
/// pending for `embed pending`. Returns `(embedded, pending)`.
pub async fn embed_chunks_inline(
    config: &Config,
    provider: &dyn EmbeddingProvider,
    store: &dyn Store,
    chunks: &[Chunk],
) -> (u64, u64) {
    let items: Vec<PendingChunk> = chunks
        .iter()
        .map(|c| PendingChunk {
            chunk_id: c.id.clone(),
            report_id: c.report_id.clone(),
            text: c.text.clone(),
            hash: c.hash.clone(),
        })
        .collect();

    let no_progress = crate::progress::NoProgress;
    match embed_batches(config, provider, store, &items, &no_progress).await {
        Ok((embedded, failed)) => (embedded, failed),
        Err(e) => {
            eprintln!("Warning: failed to store embeddings: {:#}", e);
            (0, items.len() as u64)
        }
    }
}

/// `knaack embed pending`.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    dry_run: bool,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    let pending = find_pending_chunks(&pool, provider.model_name(), limit).await?;

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  chunks needing embeddings: {}", pending.len());
        pool.close().await;
        return Ok(());
    }

    if pending.is_empty() {
        println!("embed pending");
        println!("  all chunks up to date");
        pool.close().await;
        return Ok(());
    }

    let store = SqliteStore::new(pool.clone());
    let (embedded, failed) =
        embed_batches(config, provider.as_ref(), &store, &pending, progress).await?;

    println!("embed pending");
    println!("  total pending: {}", pending.len());
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);

    pool.close().await;
    Ok(())
}

/// `knaack embed rebuild`: drop every vector, then embed all chunks.
pub async fn run_embed_rebuild(config: &Config, progress: &dyn ProgressReporter) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;

    sqlx::query("DELETE FROM chunk_vectors").execute(&pool).await?;
    sqlx::query("DELETE FROM embeddings").execute(&pool).await?;
    println!("embed rebuild: cleared existing embeddings");

    let all_chunks = find_pending_chunks(&pool, provider.model_name(), None).await?;
    if all_chunks.is_empty() {
        println!("  no chunks to embed");
        pool.close().await;
        return Ok(());
    }

    let store = SqliteStore::new(pool.clone());
    let (embedded, failed) =
        embed_batches(config, provider.as_ref(), &store, &all_chunks, progress).await?;

    println!("embed rebuild");
    println!("  total chunks: {}", all_chunks.len());
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);

    pool.close().await;
    Ok(())
}
