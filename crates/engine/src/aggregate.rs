use std::collections::BTreeMap;

use crate::model::{LifecycleStatus, MasterRecord, MonthKey, MonthlySummary, OrderKey};

/// Roll classified records into per-month summaries, oldest month first.
/// Stateless: always recomputed from the full master set, so a from-scratch
/// rebuild and an incremental run produce identical output.
pub fn monthly_summaries(master: &BTreeMap<OrderKey, MasterRecord>) -> Vec<MonthlySummary> {
    let mut months: BTreeMap<MonthKey, MonthlySummary> = BTreeMap::new();

    for record in master.values() {
        let summary = months
            .entry(record.month())
            .or_insert_with(|| MonthlySummary::empty(record.month()));
        apply(summary, record);
    }

    months.into_values().collect()
}

fn apply(summary: &mut MonthlySummary, record: &MasterRecord) {
    summary.total_orders += 1;
    match record.status {
        Some(LifecycleStatus::Cancelled) => summary.cancelled += 1,
        Some(LifecycleStatus::Returned) => summary.returned += 1,
        Some(LifecycleStatus::CompletedSettled) => summary.completed_settled += 1,
        Some(LifecycleStatus::CompletedPendingSettlement) => summary.completed_pending += 1,
        None => {}
    }
    summary.profit_paise += record.financials.profit_paise;
    summary.loss_paise += record.financials.loss_paise;
    summary.potential_paise += record.financials.potential_paise;
    summary.net_paise = summary.profit_paise - summary.loss_paise;
}
