//! Pipeline progress reporting.
//!
//! The long-running commands (`scrape`, `download`, `grades`, `index`,
//! `embed`) report what they are working on and how much is left. Progress
//! goes to **stderr** so the stdout summaries stay parseable.

use std::io::Write;

/// Pipeline stage, used as the `stage` field in JSON output.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Scrape,
    Download,
    Grades,
    Index,
    Embed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scrape => "scrape",
            Stage::Download => "download",
            Stage::Grades => "grades",
            Stage::Index => "index",
            Stage::Embed => "embed",
        }
    }
}

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// Listing pages fetched so far; the total becomes known after page one.
    Page {
        stage: Stage,
        fetched: u64,
        total: Option<u64>,
    },
    /// `n` of `total` items done; `item` names the current one.
    Item {
        stage: Stage,
        item: String,
        n: u64,
        total: u64,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// `download  C-41234  12 / 1,480 institutions` on stderr.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Page {
                stage,
                fetched,
                total,
            } => match total {
                Some(t) => format!(
                    "{}  {} / {} records\n",
                    stage.as_str(),
                    format_number(*fetched),
                    format_number(*t)
                ),
                None => format!("{}  {} records\n", stage.as_str(), format_number(*fetched)),
            },
            ProgressEvent::Item {
                stage,
                item,
                n,
                total,
            } => format!(
                "{}  {}  {} / {}\n",
                stage.as_str(),
                item,
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Page {
                stage,
                fetched,
                total,
            } => serde_json::json!({
                "event": "progress",
                "stage": stage.as_str(),
                "fetched": fetched,
                "total": total,
            }),
            ProgressEvent::Item {
                stage,
                item,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "stage": stage.as_str(),
                "item": item,
                "n": n,
                "total": total,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `--progress` setting.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
