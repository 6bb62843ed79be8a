//! Retrieval over indexed report chunks.
//!
//! Runs entirely through the [`Store`] trait. The caller embeds the query
//! (for `semantic` and `hybrid` modes) and passes the tuning parameters.
//!
//! # Scoring
//!
//! 1. Fetch `candidate_k_keyword` keyword and `candidate_k_vector` vector
//!    candidates, both already narrowed by the college filter.
//! 2. Min-max normalize each set to `[0, 1]`.
//! 3. Merge per chunk: `score = (1 - α) × keyword + α × semantic`, a chunk
//!    missing from one set scoring `0` there.
//! 4. Sort by score (desc), then chunk id (asc); truncate to `final_limit`.
//!
//! Results stay chunk-level: two passages from the same report are both
//! useful context for an answer.

use std::collections::HashMap;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::store::{ChunkCandidate, Store};

/// Search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Keyword,
    Semantic,
    Hybrid,
}

impl SearchMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "keyword" => Ok(SearchMode::Keyword),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => bail!(
                "Unknown search mode: {}. Use keyword, semantic, or hybrid.",
                other
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        }
    }

    fn uses_keyword(&self) -> bool {
        matches!(self, SearchMode::Keyword | SearchMode::Hybrid)
    }

    fn uses_vectors(&self) -> bool {
        matches!(self, SearchMode::Semantic | SearchMode::Hybrid)
    }
}

/// Retrieval tuning, decoupled from the application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub hybrid_alpha: f64,
    pub candidate_k_keyword: i64,
    pub candidate_k_vector: i64,
    pub final_limit: i64,
}

/// Inputs for one search.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    /// Required for semantic and hybrid modes.
    pub query_vec: Option<&'a [f32]>,
    pub mode: SearchMode,
    /// Case-insensitive substring of the college name.
    pub college: Option<&'a str>,
    pub params: SearchParams,
}

/// One retrieved chunk with its report metadata.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub chunk_id: String,
    pub report_id: String,
    pub aishe_id: String,
    pub college_name: Option<String>,
    /// Zero-based page within the report.
    pub page: i64,
    pub score: f64,
    pub text: String,
}

/// Run a search against a [`Store`].
pub async fn search<S: Store + ?Sized>(
    store: &S,
    req: &SearchRequest<'_>,
) -> Result<Vec<SearchResultItem>> {
    if req.query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let keyword = if req.mode.uses_keyword() {
        store
            .keyword_search(req.query, req.params.candidate_k_keyword, req.college)
            .await?
    } else {
        Vec::new()
    };

    let vector = if req.mode.uses_vectors() {
        let Some(qv) = req.query_vec else {
            bail!("query_vec is required for {} mode", req.mode.as_str());
        };
        store
            .vector_search(qv, req.params.candidate_k_vector, req.college)
            .await?
    } else {
        Vec::new()
    };

    if keyword.is_empty() && vector.is_empty() {
        return Ok(Vec::new());
    }

    let alpha = match req.mode {
        SearchMode::Keyword => 0.0,
        SearchMode::Semantic => 1.0,
        SearchMode::Hybrid => req.params.hybrid_alpha,
    };

    let kw_map = score_map(&keyword);
    let vec_map = score_map(&vector);

    let mut merged: HashMap<&str, &ChunkCandidate> = HashMap::new();
    for c in keyword.iter().chain(vector.iter()) {
        merged.entry(c.chunk_id.as_str()).or_insert(c);
    }

    let mut results = Vec::with_capacity(merged.len());
    let mut report_cache: HashMap<String, Option<(String, Option<String>)>> = HashMap::new();

    for (chunk_id, cand) in merged {
        let k = kw_map.get(chunk_id).copied().unwrap_or(0.0);
        let v = vec_map.get(chunk_id).copied().unwrap_or(0.0);

        if !report_cache.contains_key(&cand.report_id) {
            let meta = store
                .get_report(&cand.report_id)
                .await?
                .map(|r| (r.aishe_id, r.college_name));
            report_cache.insert(cand.report_id.clone(), meta);
        }
        let Some(Some((aishe_id, college_name))) = report_cache.get(&cand.report_id) else {
            continue;
        };

        results.push(SearchResultItem {
            chunk_id: cand.chunk_id.clone(),
            report_id: cand.report_id.clone(),
            aishe_id: aishe_id.clone(),
            college_name: college_name.clone(),
            page: cand.page,
            score: (1.0 - alpha) * k + alpha * v,
            text: cand.text.clone(),
        });
    }

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(req.params.final_limit.max(0) as usize);

    Ok(results)
}

fn score_map(candidates: &[ChunkCandidate]) -> HashMap<&str, f64> {
    normalize_scores(candidates)
        .into_iter()
        .map(|(c, s)| (c.chunk_id.as_str(), s))
        .collect()
}

/// Min-max normalize raw scores to `[0, 1]`. Equal scores all become `1.0`.
pub fn normalize_scores(candidates: &[ChunkCandidate]) -> Vec<(&ChunkCandidate, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let (lo, hi) = candidates.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
        (lo.min(c.raw_score), hi.max(c.raw_score))
    });

    candidates
        .iter()
        .map(|c| {
            let norm = if (hi - lo).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - lo) / (hi - lo)
            };
            (c, norm)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_pages;
    use crate::models::Report;
    use crate::store::memory::InMemoryStore;

    fn candidate(id: &str, score: f64) -> ChunkCandidate {
        ChunkCandidate {
            chunk_id: id.to_string(),
            report_id: "r".to_string(),
            page: 0,
            raw_score: score,
            text: String::new(),
        }
    }

    fn params() -> SearchParams {
        SearchParams {
            hybrid_alpha: 0.6,
            candidate_k_keyword: 40,
            candidate_k_vector: 40,
            final_limit: 4,
        }
    }

    async fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (id, aishe, college, pages) in [
            (
                "r1",
                "C-1",
                "Alpha College of Arts",
                vec!["The library has fifty thousand volumes.", "Hostel capacity is low."],
            ),
            (
                "r2",
                "C-2",
                "Beta Institute of Technology",
                vec!["Placement record and library access are strong."],
            ),
        ] {
            store
                .upsert_report(&Report {
                    id: id.to_string(),
                    aishe_id: aishe.to_string(),
                    college_name: Some(college.to_string()),
                    source_path: String::new(),
                    page_count: pages.len() as i64,
                    content_hash: String::new(),
                    updated_at: 0,
                })
                .await
                .unwrap();
            let pages: Vec<String> = pages.into_iter().map(str::to_string).collect();
            let chunks = chunk_pages(id, &pages, 1000, 200);
            let vectors: Vec<Vec<f32>> = chunks
                .iter()
                .map(|c| {
                    if c.text.contains("library") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect();
            store
                .replace_chunks(id, &chunks, Some(vectors.as_slice()))
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(SearchMode::parse("hybrid").unwrap(), SearchMode::Hybrid);
        assert!(SearchMode::parse("fuzzy").is_err());
    }

    #[test]
    fn normalize_range_and_ties() {
        let c = vec![candidate("a", 10.0), candidate("b", 5.0), candidate("c", 0.0)];
        let n = normalize_scores(&c);
        assert!((n[0].1 - 1.0).abs() < 1e-9);
        assert!((n[1].1 - 0.5).abs() < 1e-9);
        assert!(n[2].1.abs() < 1e-9);

        let tied = vec![candidate("a", 3.0), candidate("b", 3.0)];
        assert!(normalize_scores(&tied).iter().all(|(_, s)| *s == 1.0));
        assert!(normalize_scores(&[]).is_empty());
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let store = seeded_store().await;
        let req = SearchRequest {
            query: "   ",
            query_vec: None,
            mode: SearchMode::Keyword,
            college: None,
            params: params(),
        };
        assert!(search(&store, &req).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keyword_results_carry_report_metadata() {
        let store = seeded_store().await;
        let req = SearchRequest {
            query: "library",
            query_vec: None,
            mode: SearchMode::Keyword,
            college: Some("alpha"),
            params: params(),
        };
        let results = search(&store, &req).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].aishe_id, "C-1");
        assert_eq!(results[0].college_name.as_deref(), Some("Alpha College of Arts"));
        assert_eq!(results[0].page, 0);

        let json = serde_json::to_value(&results[0]).unwrap();
        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["aishe_id", "chunk_id", "college_name", "page", "report_id", "score", "text"]
        );
    }

    #[tokio::test]
    async fn semantic_mode_requires_vector() {
        let store = seeded_store().await;
        let req = SearchRequest {
            query: "library",
            query_vec: None,
            mode: SearchMode::Semantic,
            college: None,
            params: params(),
        };
        assert!(search(&store, &req).await.is_err());
    }

    #[tokio::test]
    async fn hybrid_ranks_matching_chunks_first() {
        let store = seeded_store().await;
        let qv = [1.0f32, 0.0];
        let req = SearchRequest {
            query: "library",
            query_vec: Some(&qv),
            mode: SearchMode::Hybrid,
            college: None,
            params: params(),
        };
        let results = search(&store, &req).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].text.contains("library"));
        assert!(results[1].text.contains("library"));
        assert_eq!(results[2].text, "Hostel capacity is low.");
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn final_limit_truncates() {
        let store = seeded_store().await;
        let mut p = params();
        p.final_limit = 1;
        let qv = [0.0f32, 1.0];
        let req = SearchRequest {
            query: "hostel",
            query_vec: Some(&qv),
            mode: SearchMode::Semantic,
            college: None,
            params: p,
        };
        let results = search(&store, &req).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "Hostel capacity is low.");
    }
}
