use crate::model::{Financials, LifecycleStatus, MasterRecord};

/// Compute the financial outcome for a classified record. Exactly one of
/// the three accumulators is populated (none for cancelled lines):
///
/// - settled: `profit = final_amount − (commission + logistics)`
/// - returned: `loss = customer_paid − return_settlement` (positive = cost)
/// - pending: `potential = expected settlement`, falling back to the order
///   amount when no settlement row has arrived yet
pub fn compute(record: &MasterRecord, status: LifecycleStatus) -> Financials {
    match status {
        LifecycleStatus::Cancelled => Financials::default(),
        LifecycleStatus::Returned => {
            let (paid, settled) = record
                .return_record
                .as_ref()
                .map(|r| (r.customer_paid_paise, r.settlement_paise))
                .unwrap_or((0, 0));
            Financials {
                loss_paise: paid - settled,
                ..Financials::default()
            }
        }
        LifecycleStatus::CompletedSettled => {
            let deductions = record
                .settlement
                .as_ref()
                .map(|s| s.commission_paise + s.logistics_paise)
                .unwrap_or(0);
            Financials {
                profit_paise: record.order.final_amount_paise - deductions,
                ..Financials::default()
            }
        }
        LifecycleStatus::CompletedPendingSettlement => Financials {
            potential_paise: record
                .settlement
                .as_ref()
                .map(|s| s.expected_paise)
                .unwrap_or(record.order.final_amount_paise),
            ..Financials::default()
        },
    }
}

/// Percentage of `count` in `total`. Division by zero yields 0.
pub fn rate_pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Average rupees per record. Division by zero yields 0.
pub fn avg_rupees(total_paise: i64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total_paise as f64 / 100.0 / count as f64
    }
}
