use std::fmt;

use chrono::NaiveDate;

use crate::model::{OrderKey, RecordKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad tolerance, threshold out of range).
    ConfigValidation(String),
    /// Return/settlement row that matches more than one order line.
    AmbiguousJoin {
        kind: RecordKind,
        order_release_id: String,
        candidates: usize,
    },
    /// Required field missing or inconsistent on an input record.
    MalformedRecord {
        kind: RecordKind,
        order_release_id: String,
        detail: String,
    },
    /// Incoming settlement would downgrade the stored status without a
    /// strictly later date.
    OutOfOrderReplay {
        key: OrderKey,
        have: Option<NaiveDate>,
        got: Option<NaiveDate>,
    },
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::AmbiguousJoin {
                kind,
                order_release_id,
                candidates,
            } => write!(
                f,
                "{kind} '{order_release_id}': {candidates} line items match and none is named"
            ),
            Self::MalformedRecord {
                kind,
                order_release_id,
                detail,
            } => write!(f, "{kind} '{order_release_id}': {detail}"),
            Self::OutOfOrderReplay { key, have, got } => write!(
                f,
                "settlement for {key}: dated {} would downgrade status set on {}",
                fmt_date(got),
                fmt_date(have),
            ),
        }
    }
}

impl std::error::Error for ReconError {}

fn fmt_date(d: &Option<NaiveDate>) -> String {
    match d {
        Some(d) => d.to_string(),
        None => "(no date)".to_string(),
    }
}
