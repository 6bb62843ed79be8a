//! # KNAACK Core
//!
//! Pure logic shared by the KNAACK pipeline and query router: data models,
//! the criteria/key-indicator taxonomy, grade-sheet table parsing, text
//! chunking, the report store abstraction, retrieval scoring, and the
//! embedding trait.
//!
//! This crate contains no tokio, sqlx, network, or filesystem I/O. The
//! application crate supplies page text, database-backed stores, and
//! embedding vectors.

pub mod chunk;
pub mod embedding;
pub mod gradesheet;
pub mod models;
pub mod search;
pub mod store;
pub mod table;
pub mod taxonomy;
