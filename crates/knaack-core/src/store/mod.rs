//! Storage abstraction for indexed peer-team reports.
//!
//! The [`Store`] trait covers everything the indexer and the retrieval
//! search need, so the same pipeline runs against SQLite in the application
//! and against [`memory::InMemoryStore`] in tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Report};

/// A chunk matched by keyword or vector search.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub report_id: String,
    /// Zero-based page of the chunk.
    pub page: i64,
    /// Backend score: negated BM25 rank, match count or cosine similarity.
    /// Higher is better.
    pub raw_score: f64,
    pub text: String,
}

/// Backend for report, chunk and vector storage.
///
/// `college` filters on every search method are case-insensitive substring
/// matches against the report's resolved college name. Reports without a
/// college name never match a filter.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or update a report, keyed by AISHE ID. Returns the report id
    /// (the existing one when the AISHE ID is already indexed).
    async fn upsert_report(&self, report: &Report) -> Result<String>;

    /// Look up the indexed report for an institution.
    async fn find_report(&self, aishe_id: &str) -> Result<Option<Report>>;

    /// Fetch a report by id.
    async fn get_report(&self, id: &str) -> Result<Option<Report>>;

    /// Replace all chunks of a report. When `vectors` is given it must be
    /// parallel to `chunks`.
    async fn replace_chunks(
        &self,
        report_id: &str,
        chunks: &[Chunk],
        vectors: Option<&[Vec<f32>]>,
    ) -> Result<()>;

    /// Store or replace the vector of one chunk.
    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        report_id: &str,
        vector: &[f32],
        model: &str,
        dims: usize,
        content_hash: &str,
    ) -> Result<()>;

    /// Full-text search over chunk text.
    async fn keyword_search(
        &self,
        query: &str,
        limit: i64,
        college: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>>;

    /// Cosine-similarity search over stored vectors.
    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: i64,
        college: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>>;
}

/// Case-insensitive *contains* match used for the college filter.
pub fn college_matches(college_name: Option<&str>, filter: Option<&str>) -> bool {
    match filter.map(str::trim).filter(|f| !f.is_empty()) {
        None => true,
        Some(f) => college_name
            .map(|name| name.to_lowercase().contains(&f.to_lowercase()))
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn college_filter_is_case_insensitive_contains() {
        let name = Some("FLAME University, Pune");
        assert!(college_matches(name, Some("flame")));
        assert!(college_matches(name, Some("university, pune")));
        assert!(!college_matches(name, Some("Symbiosis")));
        assert!(college_matches(name, None));
        assert!(college_matches(name, Some("  ")));
        assert!(!college_matches(None, Some("flame")));
    }
}
