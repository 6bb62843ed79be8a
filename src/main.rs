//! # KNAACK CLI (`knaack`)
//!
//! ## Usage
//!
//! ```bash
//! knaack --config ./config/knaack.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `knaack init` | Create the SQLite database, run migrations, seed the taxonomy |
//! | `knaack scrape` | Fetch the accredited-institution listing into the snapshot file |
//! | `knaack download` | Download the four report PDFs per institution |
//! | `knaack load` | Load the snapshot into `institution_details` |
//! | `knaack grades` | Extract grades from grade-sheet PDFs |
//! | `knaack index` | Chunk and index peer-team reports |
//! | `knaack sync` | All of the above, in order |
//! | `knaack embed pending` | Backfill missing or stale embeddings |
//! | `knaack embed rebuild` | Delete and regenerate all embeddings |
//! | `knaack search "<query>"` | Search report chunks |
//! | `knaack ask "<question>"` | Answer a question with the agents |
//! | `knaack serve` | Start the web front end |
//! | `knaack stats` | Print database statistics |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use knaack::progress::ProgressMode;
use knaack::{
    agents, config, download, embed_cmd, grades, indexer, listing, loader, migrate, search,
    server, stats,
};

/// KNAACK: Know about NAAC Accredited Institutes and Universities.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/knaack.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "knaack",
    about = "KNAACK: collect NAAC accreditation records and answer questions about them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/knaack.toml")]
    config: PathBuf,

    /// Progress on stderr: `human`, `json` or `off`. Defaults to `human`
    /// when stderr is a terminal.
    #[arg(long, global = true, value_parser = parse_progress)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Fetch the full accredited-institution listing.
    Scrape,

    /// Download report PDFs for every institution in the snapshot.
    Download {
        /// Only visit the first N institutions.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Load the listing snapshot into the database.
    Load,

    /// Extract criterion and key-indicator grades from grade sheets.
    Grades,

    /// Index peer-team reports for retrieval.
    Index {
        /// Only index the first N report files.
        #[arg(long)]
        limit: Option<usize>,

        /// Reindex reports even when the file is unchanged.
        #[arg(long)]
        full: bool,
    },

    /// Run scrape, download, load, grades and index in order.
    Sync {
        /// Download and index at most N institutions.
        #[arg(long)]
        limit: Option<usize>,

        /// Reindex unchanged reports.
        #[arg(long)]
        full: bool,
    },

    /// Manage embeddings.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Search indexed report chunks.
    Search {
        query: String,

        /// `keyword`, `semantic` or `hybrid`.
        #[arg(long, default_value = "keyword")]
        mode: String,

        /// Case-insensitive part of the college name.
        #[arg(long)]
        college: Option<String>,

        #[arg(long)]
        limit: Option<i64>,
    },

    /// Answer a question.
    Ask { question: String },

    /// Start the web front end.
    Serve,

    /// Show database statistics.
    Stats,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks that are missing or have stale embeddings.
    Pending {
        #[arg(long)]
        limit: Option<usize>,

        /// Override `[embedding].batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Only report how many chunks are pending.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete all embeddings and regenerate them.
    Rebuild {
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    match s {
        "human" => Ok(ProgressMode::Human),
        "json" => Ok(ProgressMode::Json),
        "off" => Ok(ProgressMode::Off),
        other => Err(format!(
            "invalid progress mode '{}': use human, json or off",
            other
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_config(&cli.config)?;
    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();
    let progress = progress.as_ref();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Scrape => {
            listing::run_scrape(&cfg, progress).await?;
        }
        Commands::Download { limit } => {
            download::run_download(&cfg, limit, progress).await?;
        }
        Commands::Load => {
            loader::run_load(&cfg).await?;
        }
        Commands::Grades => {
            grades::run_grades(&cfg, progress).await?;
        }
        Commands::Index { limit, full } => {
            indexer::run_index(&cfg, limit, full, progress).await?;
        }
        Commands::Sync { limit, full } => {
            migrate::run_migrations(&cfg).await?;
            listing::run_scrape(&cfg, progress).await?;
            download::run_download(&cfg, limit, progress).await?;
            loader::run_load(&cfg).await?;
            grades::run_grades(&cfg, progress).await?;
            indexer::run_index(&cfg, limit, full, progress).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                if let Some(b) = batch_size {
                    cfg.embedding.batch_size = b.max(1);
                }
                embed_cmd::run_embed_pending(&cfg, limit, dry_run, progress).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                if let Some(b) = batch_size {
                    cfg.embedding.batch_size = b.max(1);
                }
                embed_cmd::run_embed_rebuild(&cfg, progress).await?;
            }
        },
        Commands::Search {
            query,
            mode,
            college,
            limit,
        } => {
            search::run_search(&cfg, &query, &mode, college, limit).await?;
        }
        Commands::Ask { question } => {
            let router = agents::Router::from_config(Arc::new(cfg)).await?;
            let answer = router.ask(&question).await?;
            println!("{}", answer.answer);
            if !answer.agents.is_empty() {
                eprintln!("(answered by {})", answer.agents.join(", "));
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
