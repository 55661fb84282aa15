use crate::model::{LifecycleStatus, MasterRecord, SettlementStatus};

/// Classify one master record. Pure; precedence order is fixed and the
/// first match wins:
///
/// 1. cancelled order line
/// 2. active return, which supersedes any settlement; that settlement is
///    the return's settlement and feeds the loss side, never the profit side
/// 3. completed settlement with an actual payment
/// 4. everything else is completed but awaiting settlement
pub fn classify(record: &MasterRecord) -> LifecycleStatus {
    if record.order.is_cancelled() {
        return LifecycleStatus::Cancelled;
    }
    if record.return_record.is_some() {
        return LifecycleStatus::Returned;
    }
    if let Some(s) = &record.settlement {
        if s.status == SettlementStatus::Completed && s.actual_paise > 0 {
            return LifecycleStatus::CompletedSettled;
        }
    }
    LifecycleStatus::CompletedPendingSettlement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{merge_order_line, merge_return, merge_settlement};
    use crate::model::{OrderLine, PaymentType, ReturnRecord, ReturnType, SettlementRecord};
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn base(status: &str) -> MasterRecord {
        let order = OrderLine {
            order_release_id: "OR1".into(),
            line_item_id: "L1".into(),
            created_on: date("2025-02-10"),
            order_status: status.into(),
            cancellation_reason: None,
            packed_on: None,
            shipped_on: None,
            delivered_on: None,
            final_amount_paise: 100_000,
            mrp_paise: 120_000,
            discount_paise: 20_000,
            shipping_paise: 0,
            payment_type: PaymentType::Prepaid,
            city: None,
            state: None,
        };
        merge_order_line(None, &order)
    }

    fn with_settlement(record: &MasterRecord, status: SettlementStatus, actual: i64) -> MasterRecord {
        let s = SettlementRecord {
            order_release_id: "OR1".into(),
            line_item_id: Some("L1".into()),
            expected_paise: 90_000,
            actual_paise: actual,
            pending_paise: 90_000 - actual,
            commission_paise: 8_000,
            logistics_paise: 2_000,
            prepaid_paise: actual,
            postpaid_paise: 0,
            status,
            settlement_date: Some(date("2025-03-01")),
        };
        merge_settlement(record, &s).unwrap()
    }

    fn with_return(record: &MasterRecord) -> MasterRecord {
        let r = ReturnRecord {
            order_release_id: "OR1".into(),
            line_item_id: Some("L1".into()),
            return_type: ReturnType::Refund,
            return_date: Some(date("2025-03-05")),
            packing_date: None,
            delivery_date: None,
            customer_paid_paise: 100_000,
            settlement_paise: 80_000,
            prepaid_paise: 100_000,
            postpaid_paise: 0,
        };
        merge_return(record, &r)
    }

    #[test]
    fn cancelled_beats_everything() {
        let record = with_return(&with_settlement(
            &base("CANCELLED"),
            SettlementStatus::Completed,
            90_000,
        ));
        assert_eq!(classify(&record), LifecycleStatus::Cancelled);
    }

    #[test]
    fn cancelled_is_case_insensitive() {
        assert_eq!(classify(&base("Cancelled")), LifecycleStatus::Cancelled);
    }

    #[test]
    fn return_supersedes_completed_settlement() {
        let record = with_return(&with_settlement(
            &base("DELIVERED"),
            SettlementStatus::Completed,
            90_000,
        ));
        assert_eq!(classify(&record), LifecycleStatus::Returned);
    }

    #[test]
    fn completed_settlement_with_payment_is_settled() {
        let record = with_settlement(&base("DELIVERED"), SettlementStatus::Completed, 90_000);
        assert_eq!(classify(&record), LifecycleStatus::CompletedSettled);
    }

    #[test]
    fn completed_settlement_without_payment_stays_pending() {
        let record = with_settlement(&base("DELIVERED"), SettlementStatus::Completed, 0);
        assert_eq!(classify(&record), LifecycleStatus::CompletedPendingSettlement);
    }

    #[test]
    fn partial_settlement_stays_pending() {
        let record = with_settlement(&base("DELIVERED"), SettlementStatus::Partial, 40_000);
        assert_eq!(classify(&record), LifecycleStatus::CompletedPendingSettlement);
    }

    #[test]
    fn bare_order_is_pending_settlement() {
        assert_eq!(
            classify(&base("SHIPPED")),
            LifecycleStatus::CompletedPendingSettlement
        );
    }
}
