//! Accreditation listing scraper.
//!
//! The public dashboard serves its institution table through a DataTables
//! endpoint guarded by a Laravel CSRF token:
//!
//! 1. `GET base_url` in a cookie-carrying session and read the token from
//!    the hidden `<input name="_token">`.
//! 2. `GET base_url?_token=…&start=…&length=…` repeatedly, with the fixed
//!    filter and column descriptors the dashboard itself sends, until the
//!    listing is exhausted.
//! 3. Write `{ "recordsTotal": n, "data": [...] }` to the snapshot file,
//!    keeping every record verbatim.
//!
//! [`SourceClient`] is shared with the report downloader and owns the retry
//! policy: network errors, HTTP 429 and 5xx are retried with exponential
//! backoff (1s, 2s, 4s … capped at 32s); other 4xx fail immediately.

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use reqwest::header::{ACCEPT, REFERER};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use knaack_core::models::ListingSnapshot;

use crate::config::{Config, SourceConfig};
use crate::progress::{ProgressEvent, ProgressReporter, Stage};

pub const ACCEPT_JSON: &str = "application/json, text/javascript, */*; q=0.01";
pub const ACCEPT_HTML: &str = "text/html, */*; q=0.01";

/// `(data, name, searchable, orderable)` for each listing column.
const COLUMNS: [(&str, &str, bool, bool); 9] = [
    ("hei_assessment_id", "hei_assessment_id", false, true),
    ("hei_name", "hei_basic_profile.hei_name", true, true),
    ("aishe_id", "hei_basic_profile.aishe_id", true, true),
    ("other_address", "other_address", false, true),
    ("state_name", "state_name", false, true),
    ("iiqa_submitted_date", "iiqa_submitted_date", false, true),
    ("date_of_decleration", "date_of_decleration", false, true),
    ("grade", "grade", false, true),
    ("edit_button", "edit_button", false, false),
];

/// HTTP session against the accreditation dashboard.
pub struct SourceClient {
    http: reqwest::Client,
    config: SourceConfig,
}

impl SourceClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("knaack/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Send a request, retrying transient failures.
    pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let req = request
                .try_clone()
                .ok_or_else(|| anyhow!("request cannot be retried"))?;

            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let url = response.url().to_string();
                    let body = response.text().await.unwrap_or_default();
                    let body: String = body.chars().take(200).collect();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("{} returned {}: {}", url, status, body));
                        continue;
                    }
                    bail!("{} returned {}: {}", url, status, body);
                }
                Err(e) => {
                    last_err = Some(anyhow!(e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("request failed after retries")))
    }

    /// Fetch the dashboard page and extract its CSRF token.
    pub async fn fetch_token(&self) -> Result<String> {
        let html = self
            .send(self.http.get(self.base_url()))
            .await?
            .text()
            .await?;
        extract_token(&html).ok_or_else(|| anyhow!("No _token input found on {}", self.base_url()))
    }

    /// Fetch one page of the listing.
    pub async fn fetch_page(
        &self,
        token: &str,
        start: u64,
        length: u64,
        draw: u64,
    ) -> Result<ListingPage> {
        let params = listing_params(&self.config, token, start, length, draw);
        let request = self
            .http
            .get(self.base_url())
            .query(&params)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(REFERER, self.base_url())
            .header(ACCEPT, ACCEPT_JSON);
        let page: ListingPage = self
            .send(request)
            .await?
            .json()
            .await
            .context("Listing response is not valid DataTables JSON")?;
        Ok(page)
    }

    /// Fetch the per-institution report panel HTML.
    pub async fn fetch_institution_page(&self, hei_assessment_id: i64) -> Result<String> {
        let request = self
            .http
            .get(format!("{}/{}", self.base_url(), hei_assessment_id))
            .query(&[("status", self.config.iiqa_status.as_str())])
            .header("X-Requested-With", "XMLHttpRequest")
            .header(REFERER, self.base_url())
            .header(ACCEPT, ACCEPT_HTML);
        Ok(self.send(request).await?.text().await?)
    }

    /// Download a report file.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.send(self.http.get(url)).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Page through the whole listing.
    pub async fn fetch_listing(&self, progress: &dyn ProgressReporter) -> Result<ListingSnapshot> {
        let token = self.fetch_token().await?;
        let mut snapshot = ListingSnapshot::default();
        let mut start = 0u64;
        let mut draw = 1u64;

        loop {
            let mut length = self.config.page_size;
            if let Some(max) = self.config.max_records {
                if start >= max {
                    break;
                }
                length = length.min(max - start);
            }

            let page = self.fetch_page(&token, start, length, draw).await?;
            if draw == 1 {
                snapshot.records_total = page.records_total;
            }
            if page.data.is_empty() {
                break;
            }

            let fetched = page.data.len() as u64;
            snapshot.data.extend(page.data);
            start += fetched;
            draw += 1;

            progress.report(ProgressEvent::Page {
                stage: Stage::Scrape,
                fetched: start,
                total: Some(page.records_filtered),
            });

            if start >= page.records_filtered {
                break;
            }
        }

        Ok(snapshot)
    }
}

/// One DataTables response page.
#[derive(Debug, serde::Deserialize)]
pub struct ListingPage {
    #[serde(default, rename = "recordsTotal")]
    pub records_total: u64,
    #[serde(default, rename = "recordsFiltered")]
    pub records_filtered: u64,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

static INPUT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("input tag pattern"));
static TOKEN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bname\s*=\s*["']_token["']"#).expect("token name pattern")
});
static VALUE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bvalue\s*=\s*["']([^"']*)["']"#).expect("value pattern")
});

/// Find the value of the hidden `_token` input, whatever the attribute order.
pub fn extract_token(html: &str) -> Option<String> {
    INPUT_TAG
        .find_iter(html)
        .map(|m| m.as_str())
        .filter(|tag| TOKEN_NAME.is_match(tag))
        .find_map(|tag| VALUE_ATTR.captures(tag).map(|c| c[1].to_string()))
        .filter(|t| !t.is_empty())
}

/// Query string for one listing page, mirroring the dashboard's own request.
pub fn listing_params(
    config: &SourceConfig,
    token: &str,
    start: u64,
    length: u64,
    draw: u64,
) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = vec![
        ("_token".into(), token.into()),
        ("inst_type".into(), config.inst_type.clone()),
        ("state".into(), config.state.clone()),
        ("cycle".into(), config.cycle.clone()),
        ("iiqa_status".into(), config.iiqa_status.clone()),
        ("date_range".into(), String::new()),
        ("inst_name".into(), String::new()),
        ("draw".into(), draw.to_string()),
    ];

    for (i, (data, name, searchable, orderable)) in COLUMNS.iter().enumerate() {
        params.push((format!("columns[{}][data]", i), data.to_string()));
        params.push((format!("columns[{}][name]", i), name.to_string()));
        params.push((format!("columns[{}][searchable]", i), searchable.to_string()));
        params.push((format!("columns[{}][orderable]", i), orderable.to_string()));
        params.push((format!("columns[{}][search][value]", i), String::new()));
        params.push((format!("columns[{}][search][regex]", i), "false".into()));
    }

    params.extend([
        ("order[0][column]".into(), "5".into()),
        ("order[0][dir]".into(), "desc".into()),
        ("start".into(), start.to_string()),
        ("length".into(), length.to_string()),
        ("search[value]".into(), String::new()),
        ("search[regex]".into(), "false".into()),
        ("_".into(), chrono::Utc::now().timestamp_millis().to_string()),
    ]);

    params
}

pub fn write_snapshot(path: &Path, snapshot: &ListingSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string(snapshot)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Result<ListingSnapshot> {
    let content = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read snapshot: {} (run `knaack scrape` first)",
            path.display()
        )
    })?;
    serde_json::from_str(&content)
        .with_context(|| format!("Snapshot is not valid JSON: {}", path.display()))
}

/// `knaack scrape`.
pub async fn run_scrape(config: &Config, progress: &dyn ProgressReporter) -> Result<()> {
    let client = SourceClient::new(&config.source)?;
    let snapshot = client.fetch_listing(progress).await?;
    write_snapshot(&config.source.snapshot, &snapshot)?;

    println!("scrape");
    println!("  records total: {}", snapshot.records_total);
    println!("  records fetched: {}", snapshot.data.len());
    println!("  snapshot: {}", config.source.snapshot.display());
    Ok(())
}
