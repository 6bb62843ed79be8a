//! Configuration parsing and validation.
//!
//! KNAACK is configured with a TOML file (default `config/knaack.toml`).
//! Every section except `[db]` is optional and falls back to defaults that
//! match the public accreditation dashboard.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/knaack.sqlite"
//!
//! [source]
//! snapshot = "./data/naac_listing.json"
//! page_size = 1000
//!
//! [reports]
//! root = "./reports"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! final_limit = 4
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-004"
//! dims = 768
//! url = "https://generativelanguage.googleapis.com/v1beta/openai"
//! api_key_env = "GOOGLE_API_KEY"
//!
//! [llm]
//! provider = "openai"
//! model = "gemini-2.0-flash"
//!
//! [server]
//! bind = "127.0.0.1:8501"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use knaack_core::models::ReportKind;

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// The public listing and report downloads.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Where `scrape` writes and `load`/`download` read the listing.
    #[serde(default = "default_snapshot")]
    pub snapshot: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Stop paging after this many records.
    #[serde(default)]
    pub max_records: Option<u64>,
    #[serde(default = "default_iiqa_status")]
    pub iiqa_status: String,
    #[serde(default = "default_filter")]
    pub inst_type: String,
    #[serde(default = "default_filter")]
    pub state: String,
    #[serde(default = "default_filter")]
    pub cycle: String,
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_source_retries")]
    pub max_retries: u32,
    /// Pause between institutions during `download`.
    #[serde(default)]
    pub request_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            snapshot: default_snapshot(),
            page_size: default_page_size(),
            max_records: None,
            iiqa_status: default_iiqa_status(),
            inst_type: default_filter(),
            state: default_filter(),
            cycle: default_filter(),
            timeout_secs: default_source_timeout(),
            max_retries: default_source_retries(),
            request_delay_ms: 0,
        }
    }
}

fn default_base_url() -> String {
    "https://assessmentonline.naac.gov.in/public/index.php/hei_dashboard".to_string()
}
fn default_snapshot() -> PathBuf {
    PathBuf::from("./data/naac_listing.json")
}
fn default_page_size() -> u64 {
    1000
}
fn default_iiqa_status() -> String {
    "5".to_string()
}
fn default_filter() -> String {
    "0".to_string()
}
fn default_source_timeout() -> u64 {
    60
}
fn default_source_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsConfig {
    #[serde(default = "default_reports_root")]
    pub root: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            root: default_reports_root(),
        }
    }
}

impl ReportsConfig {
    /// Folder holding one kind of report.
    pub fn folder(&self, kind: ReportKind) -> PathBuf {
        self.root.join(kind.folder())
    }

    /// Expected path of an institution's report.
    pub fn path_for(&self, kind: ReportKind, aishe_id: &str) -> PathBuf {
        self.folder(kind).join(kind.file_name(aishe_id))
    }
}

fn default_reports_root() -> PathBuf {
    PathBuf::from("./reports")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k_keyword: i64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k_vector: i64,
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hybrid_alpha: default_hybrid_alpha(),
            candidate_k_keyword: default_candidate_k(),
            candidate_k_vector: default_candidate_k(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_candidate_k() -> i64 {
    40
}
fn default_final_limit() -> i64 {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for `openai` (up to `/v1` or equivalent) or `ollama`.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API key for `openai`.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            api_key_env: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

/// Chat model used by the agents.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    /// OpenAI-compatible base URL; `/chat/completions` is appended.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    /// Model calls allowed per agent run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Row cap the SQL agent is told to respect.
    #[serde(default = "default_sql_top_k")]
    pub sql_top_k: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_llm_key_env(),
            temperature: 0.0,
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
            max_steps: default_max_steps(),
            sql_top_k: default_sql_top_k(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}
fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_llm_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_llm_retries() -> u32 {
    2
}
fn default_max_steps() -> usize {
    12
}
fn default_sql_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

/// Parse a config from TOML text and validate it.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Read, parse and validate the config file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    if config.source.page_size == 0 {
        bail!("source.page_size must be > 0");
    }

    if config.retrieval.final_limit < 1 {
        bail!("retrieval.final_limit must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.hybrid_alpha) {
        bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        if config.embedding.dims.unwrap_or(0) == 0 {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.llm.max_steps == 0 {
        bail!("llm.max_steps must be > 0");
    }

    Ok(())
}
