//! Master merge policy: one function per entity kind, immutable in/out.
//!
//! Invariants enforced here:
//! - re-merging an identical record is a no-op (byte-identical result);
//! - absent fields in an incoming record never null out known ones;
//! - a settlement status downgrade requires a strictly later date.

use crate::error::ReconError;
use crate::model::{Financials, MasterRecord, OrderLine, ReturnRecord, SettlementRecord};

/// Fold an incoming order line into the master set.
///
/// With no existing record, a fresh master record is created with status
/// unset (pending classification). Otherwise the incoming line wins
/// field-by-field, with `None` fields keeping their stored values.
pub fn merge_order_line(existing: Option<&MasterRecord>, incoming: &OrderLine) -> MasterRecord {
    let Some(prev) = existing else {
        return MasterRecord {
            key: incoming.key(),
            order: incoming.clone(),
            return_record: None,
            settlement: None,
            status: None,
            financials: Financials::default(),
        };
    };

    let mut order = incoming.clone();
    order.cancellation_reason = order
        .cancellation_reason
        .or_else(|| prev.order.cancellation_reason.clone());
    order.packed_on = order.packed_on.or(prev.order.packed_on);
    order.shipped_on = order.shipped_on.or(prev.order.shipped_on);
    order.delivered_on = order.delivered_on.or(prev.order.delivered_on);
    order.city = order.city.or_else(|| prev.order.city.clone());
    order.state = order.state.or_else(|| prev.order.state.clone());

    MasterRecord {
        key: prev.key.clone(),
        order,
        return_record: prev.return_record.clone(),
        settlement: prev.settlement.clone(),
        status: prev.status,
        financials: prev.financials,
    }
}

/// Attach or supersede the active return. A stored return dated later than
/// the incoming one stays active (last write wins on the return date; batch
/// order breaks ties since later batches are folded later). Settlement
/// fields are untouched.
pub fn merge_return(existing: &MasterRecord, incoming: &ReturnRecord) -> MasterRecord {
    let merged = match &existing.return_record {
        None => incoming.clone(),
        Some(prev) => {
            if let (Some(p), Some(i)) = (prev.return_date, incoming.return_date) {
                if i < p {
                    return existing.clone();
                }
            }
            let mut r = incoming.clone();
            r.line_item_id = r.line_item_id.or_else(|| prev.line_item_id.clone());
            r.return_date = r.return_date.or(prev.return_date);
            r.packing_date = r.packing_date.or(prev.packing_date);
            r.delivery_date = r.delivery_date.or(prev.delivery_date);
            r
        }
    };

    MasterRecord {
        return_record: Some(merged),
        ..existing.clone()
    }
}

/// Attach or overwrite settlement fields. A downgrade of the settlement
/// status (`completed > partial > pending`) is permitted only when the
/// incoming record is dated strictly later than the stored one; otherwise
/// the merge is refused as an out-of-order replay. Return fields are
/// untouched.
pub fn merge_settlement(
    existing: &MasterRecord,
    incoming: &SettlementRecord,
) -> Result<MasterRecord, ReconError> {
    let merged = match &existing.settlement {
        None => incoming.clone(),
        Some(prev) => {
            if incoming.status.priority() < prev.status.priority() {
                let strictly_later = match (incoming.settlement_date, prev.settlement_date) {
                    (Some(i), Some(p)) => i > p,
                    _ => false,
                };
                if !strictly_later {
                    return Err(ReconError::OutOfOrderReplay {
                        key: existing.key.clone(),
                        have: prev.settlement_date,
                        got: incoming.settlement_date,
                    });
                }
            }
            let mut s = incoming.clone();
            s.line_item_id = s.line_item_id.or_else(|| prev.line_item_id.clone());
            s.settlement_date = s.settlement_date.or(prev.settlement_date);
            s
        }
    };

    Ok(MasterRecord {
        settlement: Some(merged),
        ..existing.clone()
    })
}
