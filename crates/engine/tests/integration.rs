use chrono::NaiveDate;

use settleline_engine::config::EngineConfig;
use settleline_engine::engine::run;
use settleline_engine::model::{
    AnomalyCode, Batch, LifecycleStatus, MonthKey, OrderLine, PaymentType, ReturnRecord,
    ReturnType, SettlementRecord, SettlementStatus,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn order(release: &str, created: NaiveDate, status: &str) -> OrderLine {
    OrderLine {
        order_release_id: release.into(),
        line_item_id: "L1".into(),
        created_on: created,
        order_status: status.into(),
        cancellation_reason: None,
        packed_on: None,
        shipped_on: None,
        delivered_on: Some(created + chrono::Days::new(4)),
        final_amount_paise: 100_000,
        mrp_paise: 120_000,
        discount_paise: 20_000,
        shipping_paise: 0,
        payment_type: PaymentType::Prepaid,
        city: Some("Bengaluru".into()),
        state: Some("Karnataka".into()),
    }
}

fn ret(release: &str, on: NaiveDate, settlement_paise: i64) -> ReturnRecord {
    ReturnRecord {
        order_release_id: release.into(),
        line_item_id: None,
        return_type: ReturnType::Refund,
        return_date: Some(on),
        packing_date: None,
        delivery_date: None,
        customer_paid_paise: 100_000,
        settlement_paise,
        prepaid_paise: 100_000,
        postpaid_paise: 0,
    }
}

fn settle(release: &str, on: NaiveDate, profit_paise: i64) -> SettlementRecord {
    let commission = 30_000;
    let logistics = 100_000 - profit_paise - commission;
    SettlementRecord {
        order_release_id: release.into(),
        line_item_id: None,
        expected_paise: profit_paise,
        actual_paise: profit_paise,
        pending_paise: 0,
        commission_paise: commission,
        logistics_paise: logistics,
        prepaid_paise: profit_paise,
        postpaid_paise: 0,
        status: SettlementStatus::Completed,
        settlement_date: Some(on),
    }
}

/// The reference dataset: 3995 orders created in February 2025, of which
/// 134 cancelled, 326 returned, 1551 settled, 1984 pending settlement.
/// Profits sum to ₹926292.70 and losses to ₹228916.44.
fn reference_batch() -> Batch {
    let mut orders = Vec::new();
    let mut returns = Vec::new();
    let mut settlements = Vec::new();

    for i in 1u32..=3995 {
        let release = format!("OR{i:04}");
        let day = (i % 28) + 1;
        let created = date(2025, 2, day);
        let status = if i <= 134 { "CANCELLED" } else { "DELIVERED" };
        orders.push(order(&release, created, status));

        if (135..=460).contains(&i) {
            let loss = if i == 460 { 70_469 } else { 70_219 };
            returns.push(ret(&release, date(2025, 3, day), 100_000 - loss));
        } else if (461..=2011).contains(&i) {
            let profit = if i == 2011 { 60_170 } else { 59_722 };
            settlements.push(settle(&release, date(2025, 3, day), profit));
        }
    }

    Batch {
        month: MonthKey::new(2, 2025),
        sequence: 0,
        orders,
        returns,
        settlements,
    }
}

#[test]
fn reference_dataset_report() {
    let config = EngineConfig::default();
    let result = run(&config, Vec::new(), &[reference_batch()], None).unwrap();
    let report = &result.report;

    assert_eq!(report.total_orders, 3995);
    assert_eq!(report.cancelled, 134);
    assert_eq!(report.returned, 326);
    assert_eq!(report.completed_settled, 1551);
    assert_eq!(report.completed_pending, 1984);
    assert_eq!(
        report.total_orders,
        report.cancelled + report.returned + report.completed_settled + report.completed_pending
    );

    assert_eq!(report.profit_paise, 92_629_270);
    assert_eq!(report.loss_paise, 22_891_644);
    assert_eq!(report.net_paise, 92_629_270 - 22_891_644);

    assert!((report.settlement_rate_pct - 38.82).abs() < 0.005);
    assert!((report.return_rate_pct - 8.16).abs() < 0.005);
    assert!((report.avg_profit_per_settled - 597.22).abs() < 0.005);
    assert!((report.avg_loss_per_returned - 702.20).abs() < 0.005);

    assert_eq!(report.rejected_records, 0);
    assert!(result.rejects.is_empty());
    assert!(result.anomalies.is_empty());
}

#[test]
fn every_record_feeds_exactly_one_accumulator() {
    let config = EngineConfig::default();
    let result = run(&config, Vec::new(), &[reference_batch()], None).unwrap();

    for record in &result.master {
        let f = record.financials;
        let nonzero = [f.profit_paise, f.loss_paise, f.potential_paise]
            .iter()
            .filter(|&&v| v != 0)
            .count();
        assert!(nonzero <= 1, "record {} violates exclusivity", record.key);
        if record.status == Some(LifecycleStatus::Cancelled) {
            assert_eq!(nonzero, 0);
        }
    }
}

#[test]
fn reingesting_the_same_batch_is_idempotent() {
    let config = EngineConfig::default();
    let batch = reference_batch();

    let single = run(&config, Vec::new(), &[batch.clone()], None).unwrap();

    let mut replay = batch.clone();
    replay.sequence = 1;
    let double = run(&config, Vec::new(), &[batch, replay], None).unwrap();

    assert_eq!(single.master, double.master);
    assert_eq!(single.summaries, double.summaries);
    assert_eq!(single.report.profit_paise, double.report.profit_paise);
}

#[test]
fn second_run_over_unchanged_inputs_reports_zero_changes() {
    let config = EngineConfig::default();
    let batch = reference_batch();

    let first = run(&config, Vec::new(), &[batch.clone()], None).unwrap();
    assert_eq!(first.diff.first_seen, 3995);

    let second = run(
        &config,
        first.master.clone(),
        &[batch],
        Some(&first.snapshot),
    )
    .unwrap();
    assert_eq!(second.report.status_changes, 0);
    assert_eq!(second.report.newly_settled, 0);
    assert_eq!(second.report.newly_pending, 0);
    assert_eq!(second.diff.first_seen, 0);
    assert_eq!(second.master, first.master);
}

#[test]
fn settling_pending_orders_shows_up_in_the_diff() {
    let config = EngineConfig::default();
    let created = date(2025, 2, 10);

    let feb = Batch {
        month: MonthKey::new(2, 2025),
        sequence: 0,
        orders: (1..=4)
            .map(|i| order(&format!("OR{i}"), created, "DELIVERED"))
            .collect(),
        returns: vec![],
        settlements: vec![],
    };

    let first = run(&config, Vec::new(), &[feb.clone()], None).unwrap();
    assert_eq!(first.report.completed_pending, 4);

    let mar = Batch {
        month: MonthKey::new(3, 2025),
        sequence: 0,
        orders: vec![],
        returns: vec![],
        settlements: vec![
            settle("OR1", date(2025, 3, 7), 59_722),
            settle("OR2", date(2025, 3, 7), 59_722),
        ],
    };
    let second = run(
        &config,
        first.master.clone(),
        &[mar],
        Some(&first.snapshot),
    )
    .unwrap();

    assert_eq!(second.diff.newly_settled, 2);
    assert_eq!(second.diff.status_changes, 2);
    assert_eq!(second.diff.newly_pending, 0);
    assert_eq!(second.report.completed_settled, 2);
    assert_eq!(second.report.completed_pending, 2);
}

#[test]
fn out_of_order_settlement_replay_is_rejected_and_recorded() {
    let config = EngineConfig::default();
    let created = date(2025, 2, 10);

    let feb = Batch {
        month: MonthKey::new(2, 2025),
        sequence: 0,
        orders: vec![order("OR1", created, "DELIVERED")],
        returns: vec![],
        settlements: vec![settle("OR1", date(2025, 3, 7), 59_722)],
    };
    let first = run(&config, Vec::new(), &[feb], None).unwrap();
    assert_eq!(first.report.completed_settled, 1);

    // A stale pending row dated before the accepted settlement.
    let mut stale = settle("OR1", date(2025, 3, 1), 59_722);
    stale.status = SettlementStatus::Pending;
    stale.actual_paise = 0;
    stale.pending_paise = 59_722;

    let replay = Batch {
        month: MonthKey::new(3, 2025),
        sequence: 0,
        orders: vec![],
        returns: vec![],
        settlements: vec![stale],
    };
    let second = run(
        &config,
        first.master.clone(),
        &[replay],
        Some(&first.snapshot),
    )
    .unwrap();

    // Still settled; the replay is in the rejection list.
    assert_eq!(second.report.completed_settled, 1);
    assert_eq!(second.rejects.len(), 1);
    assert!(second.rejects[0].reason.contains("downgrade"));
    assert_eq!(second.diff.status_changes, 0);
}

#[test]
fn ambiguous_return_is_rejected_and_the_run_continues() {
    let config = EngineConfig::default();
    let created = date(2025, 2, 10);

    let mut second_line = order("OR1", created, "DELIVERED");
    second_line.line_item_id = "L2".into();

    let batch = Batch {
        month: MonthKey::new(2, 2025),
        sequence: 0,
        orders: vec![order("OR1", created, "DELIVERED"), second_line],
        returns: vec![ret("OR1", date(2025, 3, 1), 80_000)],
        settlements: vec![],
    };
    let result = run(&config, Vec::new(), &[batch], None).unwrap();

    assert_eq!(result.report.total_orders, 2);
    assert_eq!(result.rejects.len(), 1);
    assert!(result.rejects[0].reason.contains("line items match"));
    assert_eq!(result.report.returned, 0);
}

#[test]
fn return_with_line_item_id_joins_despite_sibling_lines() {
    let config = EngineConfig::default();
    let created = date(2025, 2, 10);

    let mut second_line = order("OR1", created, "DELIVERED");
    second_line.line_item_id = "L2".into();

    let mut targeted = ret("OR1", date(2025, 3, 1), 80_000);
    targeted.line_item_id = Some("L2".into());

    let batch = Batch {
        month: MonthKey::new(2, 2025),
        sequence: 0,
        orders: vec![order("OR1", created, "DELIVERED"), second_line],
        returns: vec![targeted],
        settlements: vec![],
    };
    let result = run(&config, Vec::new(), &[batch], None).unwrap();

    assert!(result.rejects.is_empty());
    assert_eq!(result.report.returned, 1);
    let returned = result
        .master
        .iter()
        .find(|r| r.status == Some(LifecycleStatus::Returned))
        .unwrap();
    assert_eq!(returned.key.line_item_id, "L2");
}

#[test]
fn orphan_settlement_is_reported_as_an_anomaly() {
    let config = EngineConfig::default();
    let batch = Batch {
        month: MonthKey::new(2, 2025),
        sequence: 0,
        orders: vec![order("OR1", date(2025, 2, 10), "DELIVERED")],
        returns: vec![],
        settlements: vec![settle("OR404", date(2025, 3, 7), 59_722)],
    };
    let result = run(&config, Vec::new(), &[batch], None).unwrap();

    assert_eq!(result.orphan_settlements.len(), 1);
    assert!(result
        .anomalies
        .iter()
        .any(|a| a.code == AnomalyCode::OrphanSettlement
            && a.key.order_release_id == "OR404"));
    assert!(result.rejects.is_empty());
}

#[test]
fn over_settled_return_is_flagged() {
    let config = EngineConfig::default();
    let batch = Batch {
        month: MonthKey::new(2, 2025),
        sequence: 0,
        orders: vec![order("OR1", date(2025, 2, 10), "DELIVERED")],
        returns: vec![ret("OR1", date(2025, 3, 1), 130_000)],
        settlements: vec![],
    };
    let result = run(&config, Vec::new(), &[batch], None).unwrap();

    assert!(result
        .anomalies
        .iter()
        .any(|a| a.code == AnomalyCode::SettlementExceedsPaid));
    // Flagged, but still classified and counted.
    assert_eq!(result.report.returned, 1);
}

#[test]
fn monthly_summaries_match_the_global_report() {
    let config = EngineConfig::default();
    let result = run(&config, Vec::new(), &[reference_batch()], None).unwrap();

    assert_eq!(result.summaries.len(), 1);
    let feb = &result.summaries[0];
    assert_eq!(feb.month, MonthKey::new(2, 2025));
    assert_eq!(feb.total_orders, result.report.total_orders);
    assert_eq!(feb.profit_paise, result.report.profit_paise);
    assert_eq!(feb.loss_paise, result.report.loss_paise);
    assert_eq!(feb.potential_paise, 1984 * 100_000);
    assert_eq!(
        feb.total_orders,
        feb.cancelled + feb.returned + feb.completed_settled + feb.completed_pending
    );
}

#[test]
fn malformed_orders_are_skipped_with_a_rejection_entry() {
    let config = EngineConfig::default();
    let mut bad = order("OR1", date(2025, 2, 10), "DELIVERED");
    bad.final_amount_paise = -5;

    let batch = Batch {
        month: MonthKey::new(2, 2025),
        sequence: 0,
        orders: vec![bad, order("OR2", date(2025, 2, 11), "DELIVERED")],
        returns: vec![],
        settlements: vec![],
    };
    let result = run(&config, Vec::new(), &[batch], None).unwrap();

    assert_eq!(result.report.total_orders, 1);
    assert_eq!(result.rejects.len(), 1);
    assert!(result.rejects[0].reason.contains("negative final amount"));
    assert_eq!(result.report.accepted_records, 1);
}
