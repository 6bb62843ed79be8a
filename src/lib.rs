//! # KNAACK
//!
//! Know about NAAC Accredited Institutes and Universities: a pipeline that
//! collects public accreditation records into SQLite, and a question router
//! that answers natural-language questions from them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────────────────┐
//! │  scrape  │──▶│ download │──▶│ load · grades · index    │──▶ SQLite
//! │ listing  │   │ reports  │   │ rows   PDFs    chunks    │   FTS5+Vec
//! └──────────┘   └──────────┘   └──────────────────────────┘      │
//!                                                                 ▼
//!                            ┌──────────┐      ┌──────────────────────┐
//!                            │  serve   │◀────▶│ supervisor → sql/rag │
//!                            │ ask (CLI)│      │       agents         │
//!                            └──────────┘      └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! knaack init                 # create database and seed the taxonomy
//! knaack sync                 # scrape → download → load → grades → index
//! knaack search "library" --college "flame"
//! knaack ask "Which institutes have got the highest grade for Criteria 2?"
//! knaack serve                # web form on [server].bind
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`listing`] | Listing endpoint client and snapshot file |
//! | [`download`] | Per-institution report downloads |
//! | [`loader`] | Snapshot → `institution_details` |
//! | [`grades`] | Grade-sheet PDFs → grade tables |
//! | [`indexer`] | Peer-team reports → chunks |
//! | [`embedding`] | Embedding providers |
//! | [`search`] | Report retrieval |
//! | [`llm`] | Chat model client |
//! | [`tools`] | Agent tools |
//! | [`agents`] | Supervisor and worker agents |
//! | [`server`] | Web front end |
//! | [`db`] / [`migrate`] | Database connection and schema |

pub mod agents;
pub mod config;
pub mod db;
pub mod download;
pub mod embed_cmd;
pub mod embedding;
pub mod extract;
pub mod grades;
pub mod indexer;
pub mod listing;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod stats;
pub mod tools;
