//! `knaack search` and the retrieval entry point shared with the RAG tool.
//!
//! Scoring lives in [`knaack_core::search`]; this module wires it to the
//! SQLite store and the configured embedding provider.

use anyhow::{bail, Result};
use sqlx::SqlitePool;

use knaack_core::search::{search, SearchMode, SearchParams, SearchRequest, SearchResultItem};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

/// Search indexed report chunks, optionally narrowed to one college.
pub async fn search_reports(
    config: &Config,
    pool: &SqlitePool,
    query: &str,
    mode: SearchMode,
    college: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<SearchResultItem>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    if mode != SearchMode::Keyword && !config.embedding.is_enabled() {
        bail!(
            "Mode '{}' requires embeddings. Set [embedding] provider in config.",
            mode.as_str()
        );
    }

    let query_vec = if mode == SearchMode::Keyword {
        None
    } else {
        let provider = embedding::create_provider(&config.embedding)?;
        Some(embedding::embed_query(provider.as_ref(), &config.embedding, query).await?)
    };

    let store = SqliteStore::new(pool.clone());
    let request = SearchRequest {
        query,
        query_vec: query_vec.as_deref(),
        mode,
        college: college.map(str::trim).filter(|c| !c.is_empty()),
        params: SearchParams {
            hybrid_alpha: config.retrieval.hybrid_alpha,
            candidate_k_keyword: config.retrieval.candidate_k_keyword,
            candidate_k_vector: config.retrieval.candidate_k_vector,
            final_limit: limit.unwrap_or(config.retrieval.final_limit),
        },
    };

    search(&store, &request).await
}

/// `knaack search`.
pub async fn run_search(
    config: &Config,
    query: &str,
    mode: &str,
    college: Option<String>,
    limit: Option<i64>,
) -> Result<()> {
    let mode = SearchMode::parse(mode)?;
    let pool = db::connect(config).await?;
    let results = search_reports(config, &pool, query, mode, college.as_deref(), limit).await?;
    pool.close().await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            result.score,
            result.aishe_id,
            result.college_name.as_deref().unwrap_or("(unknown college)")
        );
        println!("    page: {}", result.page + 1);
        println!("    excerpt: \"{}\"", excerpt(&result.text, 240));
        println!("    chunk: {}", result.chunk_id);
        println!();
    }

    Ok(())
}

/// One-line excerpt of at most `max_chars` characters.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("a\n\nb  c", 10), "a b c");
        assert_eq!(excerpt("abcdef", 3), "abc...");
    }
}
