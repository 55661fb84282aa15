use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Composite identity of one order line item. Unique within the master set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub order_release_id: String,
    pub line_item_id: String,
}

impl OrderKey {
    pub fn new(order_release_id: impl Into<String>, line_item_id: impl Into<String>) -> Self {
        Self {
            order_release_id: order_release_id.into(),
            line_item_id: line_item_id.into(),
        }
    }
}

impl std::fmt::Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.order_release_id, self.line_item_id)
    }
}

/// Month bucket, rendered as `MM-YYYY`. Year-major ordering so that
/// `BTreeMap<MonthKey, _>` iterates chronologically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(month: u32, year: i32) -> Self {
        Self { year, month }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parse `MM-YYYY`.
    pub fn parse(s: &str) -> Option<Self> {
        let (m, y) = s.split_once('-')?;
        let month: u32 = m.parse().ok()?;
        let year: i32 = y.parse().ok()?;
        if !(1..=12).contains(&month) {
            return None;
        }
        Some(Self { year, month })
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}-{:04}", self.month, self.year)
    }
}

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Prepaid,
    Postpaid,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepaid => "prepaid",
            Self::Postpaid => "postpaid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prepaid" => Some(Self::Prepaid),
            // marketplace feeds label cash-on-delivery lines "cod"
            "postpaid" | "cod" => Some(Self::Postpaid),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sellable unit within a placed order, as supplied by the order feed.
/// All amounts are integer paise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_release_id: String,
    pub line_item_id: String,
    pub created_on: NaiveDate,
    /// Raw marketplace status string; `CANCELLED` drives classification.
    pub order_status: String,
    pub cancellation_reason: Option<String>,
    pub packed_on: Option<NaiveDate>,
    pub shipped_on: Option<NaiveDate>,
    pub delivered_on: Option<NaiveDate>,
    pub final_amount_paise: i64,
    pub mrp_paise: i64,
    pub discount_paise: i64,
    pub shipping_paise: i64,
    pub payment_type: PaymentType,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl OrderLine {
    pub fn key(&self) -> OrderKey {
        OrderKey::new(self.order_release_id.clone(), self.line_item_id.clone())
    }

    pub fn is_cancelled(&self) -> bool {
        self.order_status.eq_ignore_ascii_case("cancelled")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnType {
    Refund,
    Exchange,
}

impl ReturnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refund => "refund",
            Self::Exchange => "exchange",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refund" | "return" => Some(Self::Refund),
            "exchange" => Some(Self::Exchange),
            _ => None,
        }
    }
}

/// A return or exchange filed against one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub order_release_id: String,
    pub line_item_id: Option<String>,
    pub return_type: ReturnType,
    pub return_date: Option<NaiveDate>,
    pub packing_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub customer_paid_paise: i64,
    /// Amount the marketplace settles against the return.
    pub settlement_paise: i64,
    pub prepaid_paise: i64,
    pub postpaid_paise: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Completed,
    Partial,
    Pending,
}

impl SettlementStatus {
    /// Merge precedence: completed > partial > pending.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Completed => 2,
            Self::Partial => 1,
            Self::Pending => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "completed" | "settled" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }

    /// Derive a status when the feed omits one: a zero pending amount means
    /// fully settled, any actual payment means partially settled.
    pub fn derive(actual_paise: i64, pending_paise: i64) -> Self {
        if pending_paise == 0 {
            Self::Completed
        } else if actual_paise > 0 {
            Self::Partial
        } else {
            Self::Pending
        }
    }
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marketplace settlement against one order line.
/// Invariant (checked by the anomaly detector, never a rejection):
/// `actual + pending == expected` within the configured tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub order_release_id: String,
    pub line_item_id: Option<String>,
    pub expected_paise: i64,
    pub actual_paise: i64,
    pub pending_paise: i64,
    pub commission_paise: i64,
    pub logistics_paise: i64,
    pub prepaid_paise: i64,
    pub postpaid_paise: i64,
    pub status: SettlementStatus,
    pub settlement_date: Option<NaiveDate>,
}

/// One ingested monthly file set, tagged with its ingestion order.
/// Batches are folded in `(month, sequence)` order; merge rules are
/// order-sensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub month: MonthKey,
    pub sequence: u32,
    pub orders: Vec<OrderLine>,
    pub returns: Vec<ReturnRecord>,
    pub settlements: Vec<SettlementRecord>,
}

// ---------------------------------------------------------------------------
// Master dataset
// ---------------------------------------------------------------------------

/// Lifecycle status of a reconciled order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Cancelled,
    Returned,
    CompletedSettled,
    CompletedPendingSettlement,
}

impl LifecycleStatus {
    /// Stable identifier used for persistence and filters.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Returned => "returned",
            Self::CompletedSettled => "completed_settled",
            Self::CompletedPendingSettlement => "completed_pending_settlement",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "cancelled" => Some(Self::Cancelled),
            "returned" => Some(Self::Returned),
            "completed_settled" => Some(Self::CompletedSettled),
            "completed_pending_settlement" => Some(Self::CompletedPendingSettlement),
            _ => None,
        }
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Returned => write!(f, "Returned"),
            Self::CompletedSettled => write!(f, "Completed - Settled"),
            Self::CompletedPendingSettlement => write!(f, "Completed - Pending Settlement"),
        }
    }
}

/// Mutually exclusive financial outcome of one master record: at most one
/// of the three fields is non-zero. Loss is an unsigned magnitude
/// (positive = net cost to the business).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Financials {
    pub profit_paise: i64,
    pub loss_paise: i64,
    pub potential_paise: i64,
}

impl Financials {
    pub fn net_paise(&self) -> i64 {
        self.profit_paise - self.loss_paise
    }
}

/// The reconciled, merged view of one order line plus its latest return
/// and settlement. Owned exclusively by the merge engine; everything else
/// reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterRecord {
    pub key: OrderKey,
    pub order: OrderLine,
    pub return_record: Option<ReturnRecord>,
    pub settlement: Option<SettlementRecord>,
    /// `None` until the classification pass runs.
    pub status: Option<LifecycleStatus>,
    pub financials: Financials,
}

impl MasterRecord {
    /// Month bucket, derived from the order creation date.
    pub fn month(&self) -> MonthKey {
        MonthKey::from_date(self.order.created_on)
    }

    pub fn is_settled(&self) -> bool {
        self.status == Some(LifecycleStatus::CompletedSettled)
    }
}

/// Filters for querying the master set.
#[derive(Debug, Clone, Default)]
pub struct MasterFilter {
    pub key: Option<OrderKey>,
    pub from_month: Option<MonthKey>,
    pub to_month: Option<MonthKey>,
    pub status: Option<LifecycleStatus>,
    pub payment_type: Option<PaymentType>,
}

/// Query the master set by key, month range, status, and payment type.
pub fn query_master<'a>(
    records: &'a [MasterRecord],
    filter: &MasterFilter,
) -> Vec<&'a MasterRecord> {
    records
        .iter()
        .filter(|r| filter.key.as_ref().map_or(true, |k| &r.key == k))
        .filter(|r| filter.from_month.map_or(true, |m| r.month() >= m))
        .filter(|r| filter.to_month.map_or(true, |m| r.month() <= m))
        .filter(|r| filter.status.map_or(true, |s| r.status == Some(s)))
        .filter(|r| {
            filter
                .payment_type
                .map_or(true, |p| r.order.payment_type == p)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Run snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub status: LifecycleStatus,
    pub is_settled: bool,
}

/// Per-key classification outcome of the previous run. Immutable once
/// captured; replaced wholesale when a run commits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSnapshot {
    pub entries: BTreeMap<OrderKey, SnapshotEntry>,
}

impl RunSnapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Run outputs
// ---------------------------------------------------------------------------

/// Change counters between the previous snapshot and the current run.
/// Keys absent from the previous snapshot are first observations, never
/// changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunDiff {
    pub status_changes: usize,
    pub newly_settled: usize,
    pub newly_pending: usize,
    pub first_seen: usize,
    pub newly_settled_keys: Vec<OrderKey>,
    pub newly_pending_keys: Vec<OrderKey>,
}

/// Monthly roll-up, always recomputed from master records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlySummary {
    pub month: MonthKey,
    pub total_orders: usize,
    pub cancelled: usize,
    pub returned: usize,
    pub completed_settled: usize,
    pub completed_pending: usize,
    pub profit_paise: i64,
    pub loss_paise: i64,
    pub net_paise: i64,
    pub potential_paise: i64,
}

impl MonthlySummary {
    pub fn empty(month: MonthKey) -> Self {
        Self {
            month,
            total_orders: 0,
            cancelled: 0,
            returned: 0,
            completed_settled: 0,
            completed_pending: 0,
            profit_paise: 0,
            loss_paise: 0,
            net_paise: 0,
            potential_paise: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyCode {
    NegativeProfit,
    NegativeLoss,
    MissingSettlement,
    SettlementExceedsPaid,
    OrphanSettlement,
    SettlementSplitMismatch,
}

impl std::fmt::Display for AnomalyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegativeProfit => write!(f, "negative profit"),
            Self::NegativeLoss => write!(f, "negative loss"),
            Self::MissingSettlement => write!(f, "missing settlement"),
            Self::SettlementExceedsPaid => write!(f, "settlement exceeds paid amount"),
            Self::OrphanSettlement => write!(f, "orphaned settlement"),
            Self::SettlementSplitMismatch => write!(f, "settlement split mismatch"),
        }
    }
}

/// A flagged inconsistency. Data for human review, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub key: OrderKey,
    pub code: AnomalyCode,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Order,
    Return,
    Settlement,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Order => write!(f, "order"),
            Self::Return => write!(f, "return"),
            Self::Settlement => write!(f, "settlement"),
        }
    }
}

/// A record skipped during a run, with the error that excluded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    pub kind: RecordKind,
    pub order_release_id: String,
    pub reason: String,
}

/// The aggregate numbers behind the text report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconReport {
    pub total_orders: usize,
    pub cancelled: usize,
    pub returned: usize,
    pub completed_settled: usize,
    pub completed_pending: usize,
    pub profit_paise: i64,
    pub loss_paise: i64,
    pub net_paise: i64,
    pub potential_paise: i64,
    pub settlement_rate_pct: f64,
    pub return_rate_pct: f64,
    /// Rupees, 0.0 when no settled orders.
    pub avg_profit_per_settled: f64,
    /// Rupees, 0.0 when no returned orders.
    pub avg_loss_per_returned: f64,
    pub status_changes: usize,
    pub newly_settled: usize,
    pub newly_pending: usize,
    pub accepted_records: usize,
    pub rejected_records: usize,
    pub anomaly_count: usize,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
}

/// Everything one engine run produces. `snapshot` is the state to commit
/// for the next run's diff; it is carried out-of-band of the JSON output.
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub meta: RunMeta,
    pub report: ReconReport,
    pub summaries: Vec<MonthlySummary>,
    pub diff: RunDiff,
    pub anomalies: Vec<Anomaly>,
    pub rejects: Vec<RejectedRecord>,
    pub orphan_settlements: Vec<SettlementRecord>,
    pub master: Vec<MasterRecord>,
    #[serde(skip)]
    pub snapshot: RunSnapshot,
}

/// Integer paise to rupees, for display and averages.
pub fn rupees(paise: i64) -> f64 {
    paise as f64 / 100.0
}
