use std::collections::BTreeMap;

use crate::model::{
    rupees, Anomaly, AnomalyCode, LifecycleStatus, MasterRecord, OrderKey, SettlementRecord,
};

/// Scan the finalized master set for inconsistent states. Read-only;
/// findings are data for human review, never errors, and never block a run.
/// Output is ordered by key, then code.
pub fn scan(
    master: &BTreeMap<OrderKey, MasterRecord>,
    orphan_settlements: &[SettlementRecord],
    tolerance_paise: i64,
) -> Vec<Anomaly> {
    let mut findings = Vec::new();

    for (key, record) in master {
        let f = record.financials;
        if f.profit_paise < 0 {
            findings.push(Anomaly {
                key: key.clone(),
                code: AnomalyCode::NegativeProfit,
                details: format!("profit ₹{:.2}", rupees(f.profit_paise)),
            });
        }
        if f.loss_paise < 0 {
            findings.push(Anomaly {
                key: key.clone(),
                code: AnomalyCode::NegativeLoss,
                details: format!("loss ₹{:.2}", rupees(f.loss_paise)),
            });
        }

        if record.status == Some(LifecycleStatus::CompletedSettled) && record.settlement.is_none()
        {
            findings.push(Anomaly {
                key: key.clone(),
                code: AnomalyCode::MissingSettlement,
                details: format!(
                    "marked settled, order amount ₹{:.2}",
                    rupees(record.order.final_amount_paise)
                ),
            });
        }

        if record.status == Some(LifecycleStatus::Returned) {
            if let Some(r) = &record.return_record {
                if r.settlement_paise > r.customer_paid_paise {
                    findings.push(Anomaly {
                        key: key.clone(),
                        code: AnomalyCode::SettlementExceedsPaid,
                        details: format!(
                            "return settled ₹{:.2} against ₹{:.2} paid",
                            rupees(r.settlement_paise),
                            rupees(r.customer_paid_paise)
                        ),
                    });
                }
            }
        }

        if let Some(s) = &record.settlement {
            let drift = s.actual_paise + s.pending_paise - s.expected_paise;
            if drift.abs() > tolerance_paise {
                findings.push(Anomaly {
                    key: key.clone(),
                    code: AnomalyCode::SettlementSplitMismatch,
                    details: format!(
                        "actual ₹{:.2} + pending ₹{:.2} != expected ₹{:.2}",
                        rupees(s.actual_paise),
                        rupees(s.pending_paise),
                        rupees(s.expected_paise)
                    ),
                });
            }
        }
    }

    for orphan in orphan_settlements {
        findings.push(Anomaly {
            key: OrderKey::new(
                orphan.order_release_id.clone(),
                orphan.line_item_id.clone().unwrap_or_default(),
            ),
            code: AnomalyCode::OrphanSettlement,
            details: format!(
                "settlement of ₹{:.2} with no matching order line",
                rupees(orphan.actual_paise)
            ),
        });
    }

    findings.sort_by(|a, b| (&a.key, a.code).cmp(&(&b.key, b.code)));
    findings
}
