//! In-memory [`Store`] used by tests.
//!
//! Keyword search scores a chunk by how many query terms it contains;
//! vector search is a brute-force cosine scan.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, Report};

use super::{college_matches, ChunkCandidate, Store};

struct StoredVector {
    chunk_id: String,
    report_id: String,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct InMemoryStore {
    reports: RwLock<HashMap<String, Report>>,
    chunks: RwLock<Vec<Chunk>>,
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }

    fn college_of(&self, report_id: &str) -> Result<Option<String>> {
        let reports = self.reports.read().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(reports.get(report_id).and_then(|r| r.college_name.clone()))
    }

    fn chunk_allowed(&self, report_id: &str, college: Option<&str>) -> Result<bool> {
        if college.is_none() {
            return Ok(true);
        }
        Ok(college_matches(self.college_of(report_id)?.as_deref(), college))
    }
}

fn sort_and_truncate(candidates: &mut Vec<ChunkCandidate>, limit: i64) {
    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    candidates.truncate(limit.max(0) as usize);
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_report(&self, report: &Report) -> Result<String> {
        let mut reports = self.reports.write().map_err(|_| anyhow!("store lock poisoned"))?;
        let id = reports
            .values()
            .find(|r| r.aishe_id == report.aishe_id)
            .map(|r| r.id.clone())
            .unwrap_or_else(|| report.id.clone());
        let mut stored = report.clone();
        stored.id = id.clone();
        reports.insert(id.clone(), stored);
        Ok(id)
    }

    async fn find_report(&self, aishe_id: &str) -> Result<Option<Report>> {
        let reports = self.reports.read().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(reports.values().find(|r| r.aishe_id == aishe_id).cloned())
    }

    async fn get_report(&self, id: &str) -> Result<Option<Report>> {
        let reports = self.reports.read().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(reports.get(id).cloned())
    }

    async fn replace_chunks(
        &self,
        report_id: &str,
        chunks: &[Chunk],
        vectors: Option<&[Vec<f32>]>,
    ) -> Result<()> {
        if let Some(v) = vectors {
            if v.len() != chunks.len() {
                bail!("{} vectors for {} chunks", v.len(), chunks.len());
            }
        }
        {
            let mut stored = self.chunks.write().map_err(|_| anyhow!("store lock poisoned"))?;
            stored.retain(|c| c.report_id != report_id);
            stored.extend(chunks.iter().cloned());
        }
        let mut stored_vecs = self.vectors.write().map_err(|_| anyhow!("store lock poisoned"))?;
        stored_vecs.retain(|v| v.report_id != report_id);
        if let Some(vecs) = vectors {
            for (c, v) in chunks.iter().zip(vecs) {
                stored_vecs.push(StoredVector {
                    chunk_id: c.id.clone(),
                    report_id: report_id.to_string(),
                    vector: v.clone(),
                });
            }
        }
        Ok(())
    }

    async fn upsert_embedding(
        &self,
        chunk_id: &str,
        report_id: &str,
        vector: &[f32],
        _model: &str,
        _dims: usize,
        _content_hash: &str,
    ) -> Result<()> {
        let mut vecs = self.vectors.write().map_err(|_| anyhow!("store lock poisoned"))?;
        vecs.retain(|v| v.chunk_id != chunk_id);
        vecs.push(StoredVector {
            chunk_id: chunk_id.to_string(),
            report_id: report_id.to_string(),
            vector: vector.to_vec(),
        });
        Ok(())
    }

    async fn keyword_search(
        &self,
        query: &str,
        limit: i64,
        college: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().map_err(|_| anyhow!("store lock poisoned"))?;
        let mut candidates = Vec::new();
        for c in chunks.iter() {
            let text = c.text.to_lowercase();
            let hits = terms.iter().filter(|t| text.contains(**t)).count();
            if hits == 0 || !self.chunk_allowed(&c.report_id, college)? {
                continue;
            }
            candidates.push(ChunkCandidate {
                chunk_id: c.id.clone(),
                report_id: c.report_id.clone(),
                page: c.page,
                raw_score: hits as f64,
                text: c.text.clone(),
            });
        }

        sort_and_truncate(&mut candidates, limit);
        Ok(candidates)
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: i64,
        college: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>> {
        let vecs = self.vectors.read().map_err(|_| anyhow!("store lock poisoned"))?;
        let chunks = self.chunks.read().map_err(|_| anyhow!("store lock poisoned"))?;

        let mut candidates = Vec::new();
        for v in vecs.iter() {
            if !self.chunk_allowed(&v.report_id, college)? {
                continue;
            }
            let Some(chunk) = chunks.iter().find(|c| c.id == v.chunk_id) else {
                continue;
            };
            candidates.push(ChunkCandidate {
                chunk_id: v.chunk_id.clone(),
                report_id: v.report_id.clone(),
                page: chunk.page,
                raw_score: cosine_similarity(query_vec, &v.vector) as f64,
                text: chunk.text.clone(),
            });
        }

        sort_and_truncate(&mut candidates, limit);
        Ok(candidates)
    }
}
