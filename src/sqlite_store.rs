//! SQLite-backed [`Store`].
//!
//! Reports live in `reports`, chunk text in `chunks` mirrored into the
//! `chunks_fts` FTS5 index, and vectors in `chunk_vectors` with their
//! model and content hash in `embeddings`. Chunk replacement runs in one
//! transaction so the FTS index never disagrees with `chunks`.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use knaack_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use knaack_core::models::{Chunk, Report};
use knaack_core::store::{college_matches, ChunkCandidate, Store};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Turn free text into a safe FTS5 query: every word is quoted and the
/// words are OR-ed. Returns `None` when no word survives.
///
/// ```rust
/// use knaack::sqlite_store::fts_query;
///
/// assert_eq!(fts_query("NAAC's \"grade\" (2023)?").as_deref(),
///            Some("\"NAAC\" OR \"s\" OR \"grade\" OR \"2023\""));
/// assert_eq!(fts_query("?!"), None);
/// ```
pub fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn report_from_row(row: &sqlx::sqlite::SqliteRow) -> Report {
    Report {
        id: row.get("id"),
        aishe_id: row.get("aishe_id"),
        college_name: row.get("college_name"),
        source_path: row.get("source_path"),
        page_count: row.get("page_count"),
        content_hash: row.get("content_hash"),
        updated_at: row.get("updated_at"),
    }
}

const REPORT_COLUMNS: &str =
    "id, aishe_id, college_name, source_path, page_count, content_hash, updated_at";

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_report(&self, report: &Report) -> Result<String> {
        sqlx::query(
            r#"
            INSERT INTO reports (id, aishe_id, college_name, source_path, page_count,
                                 content_hash, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(aishe_id) DO UPDATE SET
                college_name = excluded.college_name,
                source_path = excluded.source_path,
                page_count = excluded.page_count,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&report.id)
        .bind(&report.aishe_id)
        .bind(&report.college_name)
        .bind(&report.source_path)
        .bind(report.page_count)
        .bind(&report.content_hash)
        .bind(report.updated_at)
        .execute(&self.pool)
        .await?;

        let id: String = sqlx::query_scalar("SELECT id FROM reports WHERE aishe_id = ?")
            .bind(&report.aishe_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn find_report(&self, aishe_id: &str) -> Result<Option<Report>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM reports WHERE aishe_id = ?",
            REPORT_COLUMNS
        ))
        .bind(aishe_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(report_from_row))
    }

    async fn get_report(&self, id: &str) -> Result<Option<Report>> {
        let row = sqlx::query(&format!("SELECT {} FROM reports WHERE id = ?", REPORT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(report_from_row))
    }

    async fn replace_chunks(
        &self,
        report_id: &str,
        chunks: &[Chunk],
        vectors: Option<&[Vec<f32>]>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE report_id = ?)",
        )
        .bind(report_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM chunk_vectors WHERE report_id = ?")
            .bind(report_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks_fts WHERE report_id = ?")
            .bind(report_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE report_id = ?")
            .bind(report_id)
            .execute(&mut *tx)
            .await?;

        for (i, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chunks (id, report_id, chunk_index, page, text, hash) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(report_id)
            .bind(chunk.chunk_index)
            .bind(chunk.page)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunks_fts (chunk_id, report_id, text) VALUES (?, ?, ?)")
                .bind(&chunk.id)
                .bind(report_id)
                .bind(&chunk.text)
                .execute(&mut *tx)
                .await?;

            if let Some(vec) = vectors.and_then(|v| v.get(i)) {
                sqlx::query(
                    "INSERT OR REPLACE INTO chunk_vectors (chunk_id, report_id, embedding) VALUES (?, ?, ?)",
                )
                .bind(&chunk.id)
                .bind(report_id)
                .bind(vec_to_blob(vec))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        report_id: &str,
        vector: &[f32],
        model: &str,
        dims: usize,
        content_hash: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO embeddings (chunk_id, model, dims, created_at, hash)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                created_at = excluded.created_at,
                hash = excluded.hash
            "#,
        )
        .bind(chunk_id)
        .bind(model)
        .bind(dims as i64)
        .bind(now)
        .bind(content_hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, report_id, embedding)
            VALUES (?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                report_id = excluded.report_id,
                embedding = excluded.embedding
            "#,
        )
        .bind(chunk_id)
        .bind(report_id)
        .bind(vec_to_blob(vector))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn keyword_search(
        &self,
        query: &str,
        limit: i64,
        college: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>> {
        let Some(fts) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let college = college.map(str::trim).filter(|c| !c.is_empty());

        // the college filter runs in Rust so both search paths fold case the
        // same way; with a filter every match is a candidate (LIMIT -1)
        let rows = sqlx::query(
            r#"
            SELECT chunks_fts.chunk_id AS chunk_id, chunks_fts.report_id AS report_id,
                   c.page AS page, c.text AS text, chunks_fts.rank AS rank,
                   r.college_name AS college_name
            FROM chunks_fts
            JOIN chunks c ON c.id = chunks_fts.chunk_id
            JOIN reports r ON r.id = chunks_fts.report_id
            WHERE chunks_fts MATCH ?
            ORDER BY chunks_fts.rank
            LIMIT ?
            "#,
        )
        .bind(&fts)
        .bind(if college.is_some() { -1 } else { limit })
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter(|row| {
                let name: Option<String> = row.get("college_name");
                college_matches(name.as_deref(), college)
            })
            .take(limit.max(0) as usize)
            .map(|row| {
                let rank: f64 = row.get("rank");
                ChunkCandidate {
                    chunk_id: row.get("chunk_id"),
                    report_id: row.get("report_id"),
                    page: row.get("page"),
                    raw_score: -rank,
                    text: row.get("text"),
                }
            })
            .collect())
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: i64,
        college: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, cv.report_id, cv.embedding, c.page, c.text, r.college_name
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN reports r ON r.id = cv.report_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<ChunkCandidate> = rows
            .iter()
            .filter(|row| {
                let name: Option<String> = row.get("college_name");
                college_matches(name.as_deref(), college)
            })
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ChunkCandidate {
                    chunk_id: row.get("chunk_id"),
                    report_id: row.get("report_id"),
                    page: row.get("page"),
                    raw_score: cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64,
                    text: row.get("text"),
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        candidates.truncate(limit.max(0) as usize);
        Ok(candidates)
    }
}
