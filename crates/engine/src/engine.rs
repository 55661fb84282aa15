use std::collections::BTreeMap;

use crate::aggregate::monthly_summaries;
use crate::anomaly;
use crate::classify::classify;
use crate::config::EngineConfig;
use crate::diff::{diff_run, snapshot};
use crate::error::ReconError;
use crate::finance;
use crate::merge::{merge_order_line, merge_return, merge_settlement};
use crate::model::{
    Batch, MasterRecord, OrderKey, OrderLine, RecordKind, RejectedRecord, RunMeta, RunResult,
    RunSnapshot,
};
use crate::report::{build_report, render_text};
use crate::resolve::{LineIndex, Resolution};

/// Run reconciliation over a set of monthly batches.
///
/// `previous_master` is the persisted dataset from earlier runs (empty on
/// the first run); `previous_snapshot` drives the run diff. Batches are
/// folded in `(month, sequence)` order, orders first across all batches,
/// then returns, then settlements, so merge results are deterministic.
/// Per-record failures land in the rejection list; the run keeps going.
pub fn run(
    config: &EngineConfig,
    previous_master: Vec<MasterRecord>,
    batches: &[Batch],
    previous_snapshot: Option<&RunSnapshot>,
) -> Result<RunResult, ReconError> {
    config.validate()?;

    let mut master: BTreeMap<OrderKey, MasterRecord> = previous_master
        .into_iter()
        .map(|r| (r.key.clone(), r))
        .collect();

    let mut index = LineIndex::default();
    for key in master.keys() {
        index.insert_key(key);
    }

    let mut ordered: Vec<&Batch> = batches.iter().collect();
    ordered.sort_by_key(|b| (b.month, b.sequence));

    let mut rejects: Vec<RejectedRecord> = Vec::new();
    let mut orphans = Vec::new();
    let mut accepted = 0usize;

    // Orders first: the line index must be complete before joins.
    for batch in &ordered {
        for order in &batch.orders {
            if let Err(err) = check_order(order, config.tolerance.amount_paise) {
                rejects.push(reject(RecordKind::Order, &order.order_release_id, &err));
                continue;
            }
            let key = order.key();
            let merged = merge_order_line(master.get(&key), order);
            master.insert(key.clone(), merged);
            index.insert_key(&key);
            accepted += 1;
        }
    }

    for batch in &ordered {
        for ret in &batch.returns {
            match index.resolve(
                RecordKind::Return,
                &ret.order_release_id,
                ret.line_item_id.as_deref(),
            ) {
                Ok(Resolution::Key(key)) => {
                    if let Some(existing) = master.get(&key) {
                        let merged = merge_return(existing, ret);
                        master.insert(key, merged);
                        accepted += 1;
                    }
                }
                Ok(Resolution::Unknown) => {
                    let err = ReconError::MalformedRecord {
                        kind: RecordKind::Return,
                        order_release_id: ret.order_release_id.clone(),
                        detail: "no matching order line".into(),
                    };
                    rejects.push(reject(RecordKind::Return, &ret.order_release_id, &err));
                }
                Err(err) => {
                    rejects.push(reject(RecordKind::Return, &ret.order_release_id, &err));
                }
            }
        }
    }

    for batch in &ordered {
        for settlement in &batch.settlements {
            match index.resolve(
                RecordKind::Settlement,
                &settlement.order_release_id,
                settlement.line_item_id.as_deref(),
            ) {
                Ok(Resolution::Key(key)) => {
                    if let Some(existing) = master.get(&key) {
                        match merge_settlement(existing, settlement) {
                            Ok(merged) => {
                                master.insert(key, merged);
                                accepted += 1;
                            }
                            Err(err) => {
                                rejects.push(reject(
                                    RecordKind::Settlement,
                                    &settlement.order_release_id,
                                    &err,
                                ));
                            }
                        }
                    }
                }
                // Orphaned settlements are reported, not discarded.
                Ok(Resolution::Unknown) => orphans.push(settlement.clone()),
                Err(err) => {
                    rejects.push(reject(
                        RecordKind::Settlement,
                        &settlement.order_release_id,
                        &err,
                    ));
                }
            }
        }
    }

    // Classification + financials over the finalized merge result.
    for record in master.values_mut() {
        let status = classify(record);
        record.status = Some(status);
        record.financials = finance::compute(record, status);
    }

    // The three read-only consumers see the same immutable dataset.
    let diff = diff_run(previous_snapshot, &master);
    let summaries = monthly_summaries(&master);
    let anomalies = anomaly::scan(&master, &orphans, config.tolerance.amount_paise);
    let new_snapshot = snapshot(&master);

    let mut report = build_report(config, &master, &diff, &anomalies, &rejects);
    report.accepted_records = accepted;

    Ok(RunResult {
        meta: RunMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        report,
        summaries,
        diff,
        anomalies,
        rejects,
        orphan_settlements: orphans,
        master: master.into_values().collect(),
        snapshot: new_snapshot,
    })
}

/// Render the result's text report.
pub fn report_text(result: &RunResult) -> String {
    render_text(&result.report)
}

fn check_order(order: &OrderLine, tolerance_paise: i64) -> Result<(), ReconError> {
    if order.order_release_id.is_empty() || order.line_item_id.is_empty() {
        return Err(malformed(order, "missing order/line identifier"));
    }
    if order.final_amount_paise < 0 {
        return Err(malformed(order, "negative final amount"));
    }
    if order.mrp_paise + tolerance_paise < order.final_amount_paise - order.discount_paise {
        return Err(malformed(order, "MRP below discounted amount"));
    }
    Ok(())
}

fn malformed(order: &OrderLine, detail: &str) -> ReconError {
    ReconError::MalformedRecord {
        kind: RecordKind::Order,
        order_release_id: order.order_release_id.clone(),
        detail: detail.into(),
    }
}

fn reject(kind: RecordKind, order_release_id: &str, err: &ReconError) -> RejectedRecord {
    RejectedRecord {
        kind,
        order_release_id: order_release_id.to_string(),
        reason: err.to_string(),
    }
}
