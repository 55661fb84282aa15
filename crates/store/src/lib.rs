//! `settleline-store` — durable state for the reconciliation engine.
//!
//! Two concerns, both outside the pure engine: the SQLite-backed master
//! dataset and run snapshot (atomic commit per run), and CSV ingestion of
//! the monthly order/return/settlement exports.

pub mod db;
pub mod error;
pub mod ingest;

pub use db::Store;
pub use error::StoreError;
pub use ingest::{load_batches, scan_directory};
