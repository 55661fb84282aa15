use std::collections::BTreeMap;

use crate::model::{
    LifecycleStatus, MasterRecord, OrderKey, RunDiff, RunSnapshot, SnapshotEntry,
};

/// Compare the freshly classified master set against the previous run's
/// snapshot. Keys with no previous entry are first observations and count
/// toward `first_seen` only.
pub fn diff_run(
    previous: Option<&RunSnapshot>,
    master: &BTreeMap<OrderKey, MasterRecord>,
) -> RunDiff {
    let mut diff = RunDiff::default();

    for (key, record) in master {
        let Some(status) = record.status else {
            continue;
        };
        let settled = record.is_settled();

        match previous.and_then(|p| p.entries.get(key)) {
            None => diff.first_seen += 1,
            Some(prev) => {
                if prev.status != status {
                    diff.status_changes += 1;
                }
                if !prev.is_settled && settled {
                    diff.newly_settled += 1;
                    diff.newly_settled_keys.push(key.clone());
                }
                if status == LifecycleStatus::CompletedPendingSettlement
                    && prev.status != LifecycleStatus::CompletedPendingSettlement
                {
                    diff.newly_pending += 1;
                    diff.newly_pending_keys.push(key.clone());
                }
            }
        }
    }

    diff
}

/// Capture the snapshot for the run that just completed.
pub fn snapshot(master: &BTreeMap<OrderKey, MasterRecord>) -> RunSnapshot {
    let entries = master
        .iter()
        .filter_map(|(key, record)| {
            record.status.map(|status| {
                (
                    key.clone(),
                    SnapshotEntry {
                        status,
                        is_settled: record.is_settled(),
                    },
                )
            })
        })
        .collect();
    RunSnapshot { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merge_order_line;
    use crate::model::{OrderLine, PaymentType};
    use chrono::NaiveDate;

    fn record(release: &str, status: LifecycleStatus) -> (OrderKey, MasterRecord) {
        let order = OrderLine {
            order_release_id: release.into(),
            line_item_id: "L1".into(),
            created_on: NaiveDate::from_ymd_opt(2025, 2, 10).unwrap(),
            order_status: "DELIVERED".into(),
            cancellation_reason: None,
            packed_on: None,
            shipped_on: None,
            delivered_on: None,
            final_amount_paise: 100_000,
            mrp_paise: 100_000,
            discount_paise: 0,
            shipping_paise: 0,
            payment_type: PaymentType::Prepaid,
            city: None,
            state: None,
        };
        let mut r = merge_order_line(None, &order);
        r.status = Some(status);
        (r.key.clone(), r)
    }

    fn master(entries: Vec<(OrderKey, MasterRecord)>) -> BTreeMap<OrderKey, MasterRecord> {
        entries.into_iter().collect()
    }

    #[test]
    fn first_run_counts_only_first_seen() {
        let m = master(vec![
            record("OR1", LifecycleStatus::CompletedPendingSettlement),
            record("OR2", LifecycleStatus::CompletedPendingSettlement),
        ]);
        let diff = diff_run(None, &m);
        assert_eq!(diff.first_seen, 2);
        assert_eq!(diff.status_changes, 0);
        assert_eq!(diff.newly_settled, 0);
        assert_eq!(diff.newly_pending, 0);
    }

    #[test]
    fn settling_half_counts_exactly_that_half() {
        let all_pending = master(vec![
            record("OR1", LifecycleStatus::CompletedPendingSettlement),
            record("OR2", LifecycleStatus::CompletedPendingSettlement),
            record("OR3", LifecycleStatus::CompletedPendingSettlement),
            record("OR4", LifecycleStatus::CompletedPendingSettlement),
        ]);
        let prev = snapshot(&all_pending);

        let half_settled = master(vec![
            record("OR1", LifecycleStatus::CompletedSettled),
            record("OR2", LifecycleStatus::CompletedSettled),
            record("OR3", LifecycleStatus::CompletedPendingSettlement),
            record("OR4", LifecycleStatus::CompletedPendingSettlement),
        ]);
        let diff = diff_run(Some(&prev), &half_settled);
        assert_eq!(diff.newly_settled, 2);
        assert_eq!(diff.status_changes, 2);
        assert_eq!(diff.newly_pending, 0);
        assert_eq!(
            diff.newly_settled_keys,
            vec![OrderKey::new("OR1", "L1"), OrderKey::new("OR2", "L1")]
        );

        // Re-running against the freshly committed snapshot yields no changes.
        let committed = snapshot(&half_settled);
        let rerun = diff_run(Some(&committed), &half_settled);
        assert_eq!(rerun.status_changes, 0);
        assert_eq!(rerun.newly_settled, 0);
        assert_eq!(rerun.newly_pending, 0);
    }

    #[test]
    fn newly_pending_tracks_transitions_into_pending() {
        let prev_state = master(vec![record("OR1", LifecycleStatus::CompletedSettled)]);
        let prev = snapshot(&prev_state);

        let now = master(vec![
            record("OR1", LifecycleStatus::CompletedPendingSettlement),
            record("OR2", LifecycleStatus::CompletedPendingSettlement),
        ]);
        let diff = diff_run(Some(&prev), &now);
        // OR2 is first-seen, not newly pending
        assert_eq!(diff.newly_pending, 1);
        assert_eq!(diff.first_seen, 1);
        assert_eq!(diff.newly_pending_keys, vec![OrderKey::new("OR1", "L1")]);
    }

    #[test]
    fn snapshot_captures_status_and_settled_flag() {
        let m = master(vec![
            record("OR1", LifecycleStatus::CompletedSettled),
            record("OR2", LifecycleStatus::Returned),
        ]);
        let snap = snapshot(&m);
        let e1 = &snap.entries[&OrderKey::new("OR1", "L1")];
        assert!(e1.is_settled);
        let e2 = &snap.entries[&OrderKey::new("OR2", "L1")];
        assert!(!e2.is_settled);
        assert_eq!(e2.status, LifecycleStatus::Returned);
    }
}
