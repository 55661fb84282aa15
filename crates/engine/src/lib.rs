//! `settleline-engine` — order/return/settlement reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded monthly batches, folds them into
//! the per-order-line master dataset, classifies lifecycle status, derives
//! financials, and diffs the result against the previous run's snapshot.
//! No CLI or IO dependencies.

pub mod aggregate;
pub mod anomaly;
pub mod classify;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod finance;
pub mod merge;
pub mod model;
pub mod report;
pub mod resolve;

pub use config::EngineConfig;
pub use engine::run;
pub use error::ReconError;
pub use model::{
    Batch, LifecycleStatus, MasterRecord, MonthKey, OrderKey, RunResult, RunSnapshot,
};
