//! CSV batch ingestion: scans a data directory for the monthly exports
//! (`orders-MM-YYYY.csv`, `returns-MM-YYYY.csv`, `settlement-MM-YYYY.csv`)
//! and parses them into engine batches. Row-level failures are recoverable:
//! the row lands in the rejection list and ingestion keeps going.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

use settleline_engine::model::{
    Batch, MonthKey, OrderLine, PaymentType, RecordKind, RejectedRecord, ReturnRecord,
    ReturnType, SettlementRecord, SettlementStatus,
};

use crate::error::StoreError;

/// The monthly file set for one month key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFiles {
    pub month: MonthKey,
    pub orders: Option<PathBuf>,
    pub returns: Option<PathBuf>,
    pub settlements: Option<PathBuf>,
}

/// Scan a directory for monthly batch files, oldest month first.
pub fn scan_directory(dir: &Path) -> Result<Vec<BatchFiles>, StoreError> {
    let mut by_month: BTreeMap<MonthKey, BatchFiles> = BTreeMap::new();

    let entries = std::fs::read_dir(dir).map_err(|e| StoreError::Io(e.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::Io(e.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();

        let Some((kind, month)) = classify_filename(&name) else {
            continue;
        };
        let set = by_month.entry(month).or_insert_with(|| BatchFiles {
            month,
            orders: None,
            returns: None,
            settlements: None,
        });
        let path = entry.path();
        match kind {
            RecordKind::Order => set.orders = Some(path),
            RecordKind::Return => set.returns = Some(path),
            RecordKind::Settlement => set.settlements = Some(path),
        }
    }

    Ok(by_month.into_values().collect())
}

fn classify_filename(name: &str) -> Option<(RecordKind, MonthKey)> {
    let stem = name.strip_suffix(".csv")?;
    for (prefix, kind) in [
        ("orders-", RecordKind::Order),
        ("returns-", RecordKind::Return),
        ("settlement-", RecordKind::Settlement),
    ] {
        if let Some(rest) = stem.strip_prefix(prefix) {
            return MonthKey::parse(rest).map(|m| (kind, m));
        }
    }
    None
}

/// Load all scanned file sets into engine batches. The batch sequence is
/// the position in the (month-ordered) scan result.
pub fn load_batches(
    sets: &[BatchFiles],
) -> Result<(Vec<Batch>, Vec<RejectedRecord>), StoreError> {
    let mut batches = Vec::with_capacity(sets.len());
    let mut rejects = Vec::new();

    for (sequence, set) in sets.iter().enumerate() {
        let mut batch = Batch {
            month: set.month,
            sequence: sequence as u32,
            orders: Vec::new(),
            returns: Vec::new(),
            settlements: Vec::new(),
        };
        if let Some(path) = &set.orders {
            let data = read_file(path)?;
            batch.orders = parse_orders_csv(&data, &label(path), &mut rejects)?;
        }
        if let Some(path) = &set.returns {
            let data = read_file(path)?;
            batch.returns = parse_returns_csv(&data, &label(path), &mut rejects)?;
        }
        if let Some(path) = &set.settlements {
            let data = read_file(path)?;
            batch.settlements = parse_settlements_csv(&data, &label(path), &mut rejects)?;
        }
        batches.push(batch);
    }

    Ok((batches, rejects))
}

fn read_file(path: &Path) -> Result<String, StoreError> {
    std::fs::read_to_string(path).map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))
}

fn label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// CSV parsers
// ---------------------------------------------------------------------------

struct Header {
    file: String,
    columns: Vec<String>,
}

impl Header {
    fn idx(&self, name: &str) -> Result<usize, StoreError> {
        self.columns
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| StoreError::MissingColumn {
                file: self.file.clone(),
                column: name.into(),
            })
    }

    fn opt_idx(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|h| h == name)
    }
}

fn reader(data: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data.as_bytes())
}

fn header(rd: &mut csv::Reader<&[u8]>, file: &str) -> Result<Header, StoreError> {
    let columns = rd
        .headers()
        .map_err(|e| StoreError::Io(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    Ok(Header {
        file: file.into(),
        columns,
    })
}

/// Parse the order export. Header names carry spaces, as the marketplace
/// exports them.
pub fn parse_orders_csv(
    data: &str,
    file: &str,
    rejects: &mut Vec<RejectedRecord>,
) -> Result<Vec<OrderLine>, StoreError> {
    let mut rd = reader(data);
    let header = header(&mut rd, file)?;

    let release_idx = header.idx("order release id")?;
    let line_idx = header.idx("order line id")?;
    let created_idx = header.idx("created on")?;
    let status_idx = header.idx("order status")?;
    let final_idx = header.idx("final amount")?;
    let mrp_idx = header.idx("total mrp")?;
    let discount_idx = header.opt_idx("discount");
    let shipping_idx = header.opt_idx("shipping charge");
    let payment_idx = header.opt_idx("payment type");
    let reason_idx = header.opt_idx("cancellation reason");
    let packed_idx = header.opt_idx("packed on");
    let shipped_idx = header.opt_idx("shipped on");
    let delivered_idx = header.opt_idx("delivered on");
    let city_idx = header.opt_idx("city");
    let state_idx = header.opt_idx("state");

    let mut orders = Vec::new();
    for record in rd.records() {
        let record = record.map_err(|e| StoreError::Io(e.to_string()))?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();
        let opt_field = |i: Option<usize>| i.map(&field).filter(|s| !s.is_empty());

        let release = field(release_idx).to_string();
        if release.is_empty() {
            reject(rejects, RecordKind::Order, file, "", "empty order release id");
            continue;
        }

        let Some(created_on) = parse_date(field(created_idx)) else {
            reject(rejects, RecordKind::Order, file, &release, "unparsable created on");
            continue;
        };
        let Some(final_amount_paise) = parse_amount(field(final_idx)) else {
            reject(rejects, RecordKind::Order, file, &release, "unparsable final amount");
            continue;
        };
        let Some(mrp_paise) = parse_amount(field(mrp_idx)) else {
            reject(rejects, RecordKind::Order, file, &release, "unparsable total mrp");
            continue;
        };

        let payment_type = match opt_field(payment_idx) {
            None => PaymentType::Prepaid,
            Some(raw) => match PaymentType::parse(raw) {
                Some(p) => p,
                None => {
                    reject(rejects, RecordKind::Order, file, &release, "unknown payment type");
                    continue;
                }
            },
        };

        orders.push(OrderLine {
            order_release_id: release,
            line_item_id: field(line_idx).to_string(),
            created_on,
            order_status: field(status_idx).to_string(),
            cancellation_reason: opt_field(reason_idx).map(str::to_string),
            packed_on: opt_field(packed_idx).and_then(parse_date),
            shipped_on: opt_field(shipped_idx).and_then(parse_date),
            delivered_on: opt_field(delivered_idx).and_then(parse_date),
            final_amount_paise,
            mrp_paise,
            discount_paise: opt_field(discount_idx).and_then(parse_amount).unwrap_or(0),
            shipping_paise: opt_field(shipping_idx).and_then(parse_amount).unwrap_or(0),
            payment_type,
            city: opt_field(city_idx).map(str::to_string),
            state: opt_field(state_idx).map(str::to_string),
        });
    }

    Ok(orders)
}

pub fn parse_returns_csv(
    data: &str,
    file: &str,
    rejects: &mut Vec<RejectedRecord>,
) -> Result<Vec<ReturnRecord>, StoreError> {
    let mut rd = reader(data);
    let header = header(&mut rd, file)?;

    let release_idx = header.idx("order_release_id")?;
    let type_idx = header.idx("return_type")?;
    let paid_idx = header.idx("customer_paid_amount")?;
    let settled_idx = header.idx("total_actual_settlement")?;
    let line_idx = header.opt_idx("order_line_id");
    let return_date_idx = header.opt_idx("return_date");
    let packing_idx = header.opt_idx("packing_date");
    let delivery_idx = header.opt_idx("delivery_date");
    let prepaid_idx = header.opt_idx("prepaid_amount");
    let postpaid_idx = header.opt_idx("postpaid_amount");

    let mut returns = Vec::new();
    for record in rd.records() {
        let record = record.map_err(|e| StoreError::Io(e.to_string()))?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();
        let opt_field = |i: Option<usize>| i.map(&field).filter(|s| !s.is_empty());

        let release = field(release_idx).to_string();
        if release.is_empty() {
            reject(rejects, RecordKind::Return, file, "", "empty order release id");
            continue;
        }
        let Some(return_type) = ReturnType::parse(field(type_idx)) else {
            reject(rejects, RecordKind::Return, file, &release, "unknown return type");
            continue;
        };
        let Some(customer_paid_paise) = parse_amount(field(paid_idx)) else {
            reject(rejects, RecordKind::Return, file, &release, "unparsable customer paid amount");
            continue;
        };
        let Some(settlement_paise) = parse_amount(field(settled_idx)) else {
            reject(rejects, RecordKind::Return, file, &release, "unparsable settlement amount");
            continue;
        };

        returns.push(ReturnRecord {
            order_release_id: release,
            line_item_id: opt_field(line_idx).map(str::to_string),
            return_type,
            return_date: opt_field(return_date_idx).and_then(parse_date),
            packing_date: opt_field(packing_idx).and_then(parse_date),
            delivery_date: opt_field(delivery_idx).and_then(parse_date),
            customer_paid_paise,
            settlement_paise,
            prepaid_paise: opt_field(prepaid_idx).and_then(parse_amount).unwrap_or(0),
            postpaid_paise: opt_field(postpaid_idx).and_then(parse_amount).unwrap_or(0),
        });
    }

    Ok(returns)
}

pub fn parse_settlements_csv(
    data: &str,
    file: &str,
    rejects: &mut Vec<RejectedRecord>,
) -> Result<Vec<SettlementRecord>, StoreError> {
    let mut rd = reader(data);
    let header = header(&mut rd, file)?;

    let release_idx = header.idx("order_release_id")?;
    let expected_idx = header.idx("total_expected_settlement")?;
    let actual_idx = header.idx("total_actual_settlement")?;
    let pending_idx = header.idx("amount_pending_settlement")?;
    let line_idx = header.opt_idx("order_line_id");
    let commission_idx = header.opt_idx("total_commission");
    let logistics_idx = header.opt_idx("total_logistics_deduction");
    let prepaid_idx = header.opt_idx("prepaid_payment");
    let postpaid_idx = header.opt_idx("postpaid_payment");
    let status_idx = header.opt_idx("settlement_status");
    let date_idx = header.opt_idx("settlement_date");

    let mut settlements = Vec::new();
    for record in rd.records() {
        let record = record.map_err(|e| StoreError::Io(e.to_string()))?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();
        let opt_field = |i: Option<usize>| i.map(&field).filter(|s| !s.is_empty());

        let release = field(release_idx).to_string();
        if release.is_empty() {
            reject(rejects, RecordKind::Settlement, file, "", "empty order release id");
            continue;
        }
        let Some(expected_paise) = parse_amount(field(expected_idx)) else {
            reject(rejects, RecordKind::Settlement, file, &release, "unparsable expected settlement");
            continue;
        };
        let Some(actual_paise) = parse_amount(field(actual_idx)) else {
            reject(rejects, RecordKind::Settlement, file, &release, "unparsable actual settlement");
            continue;
        };
        let Some(pending_paise) = parse_amount(field(pending_idx)) else {
            reject(rejects, RecordKind::Settlement, file, &release, "unparsable pending settlement");
            continue;
        };

        // Feeds that omit the status column get it derived from amounts.
        let status = opt_field(status_idx)
            .and_then(SettlementStatus::parse)
            .unwrap_or_else(|| SettlementStatus::derive(actual_paise, pending_paise));

        settlements.push(SettlementRecord {
            order_release_id: release,
            line_item_id: opt_field(line_idx).map(str::to_string),
            expected_paise,
            actual_paise,
            pending_paise,
            commission_paise: opt_field(commission_idx).and_then(parse_amount).unwrap_or(0),
            logistics_paise: opt_field(logistics_idx).and_then(parse_amount).unwrap_or(0),
            prepaid_paise: opt_field(prepaid_idx).and_then(parse_amount).unwrap_or(0),
            postpaid_paise: opt_field(postpaid_idx).and_then(parse_amount).unwrap_or(0),
            status,
            settlement_date: opt_field(date_idx).and_then(parse_date),
        });
    }

    Ok(settlements)
}

fn reject(
    rejects: &mut Vec<RejectedRecord>,
    kind: RecordKind,
    file: &str,
    release: &str,
    detail: &str,
) {
    warn!(file, order_release_id = release, detail, "skipping {kind} row");
    rejects.push(RejectedRecord {
        kind,
        order_release_id: release.to_string(),
        reason: format!("{file}: {detail}"),
    });
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

/// Parse a currency field into paise. Tolerates the rupee sign and
/// thousands separators the exports carry.
fn parse_amount(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '₹' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    Some((value * 100.0).round() as i64)
}

/// The exports mix several date layouts; try them in order.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    for fmt in ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%m/%d/%y %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS_CSV: &str = "\
order release id,order line id,created on,order status,final amount,total mrp,discount,payment type
OR1,L1,2025-02-10,DELIVERED,1499.00,1999.00,500.00,prepaid
OR2,L1,10-02-2025,CANCELLED,\"₹2,499.00\",2999.00,500.00,cod
OR3,L1,not-a-date,DELIVERED,100.00,100.00,0,prepaid
";

    const RETURNS_CSV: &str = "\
order_release_id,order_line_id,return_type,return_date,customer_paid_amount,total_actual_settlement
OR1,L1,refund,2025-03-01,1499.00,1200.00
OR2,,exchange,2025-03-02,2499.00,2499.00
OR9,L1,donation,2025-03-03,10.00,10.00
";

    const SETTLEMENT_CSV: &str = "\
order_release_id,total_expected_settlement,total_actual_settlement,amount_pending_settlement,total_commission,settlement_date
OR1,1300.00,1300.00,0.00,150.00,2025-03-05
OR2,2000.00,900.00,1100.00,100.00,2025-03-06
OR3,500.00,0.00,500.00,0.00,
";

    #[test]
    fn parses_orders_and_rejects_bad_rows() {
        let mut rejects = Vec::new();
        let orders = parse_orders_csv(ORDERS_CSV, "orders-02-2025.csv", &mut rejects).unwrap();
        assert_eq!(orders.len(), 2);

        assert_eq!(orders[0].order_release_id, "OR1");
        assert_eq!(orders[0].final_amount_paise, 149_900);
        assert_eq!(orders[0].payment_type, PaymentType::Prepaid);

        // dd-mm-yyyy date, rupee sign, thousands separator, cod mapping
        assert_eq!(orders[1].created_on.to_string(), "2025-02-10");
        assert_eq!(orders[1].final_amount_paise, 249_900);
        assert_eq!(orders[1].payment_type, PaymentType::Postpaid);

        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects[0].order_release_id, "OR3");
        assert!(rejects[0].reason.contains("created on"));
    }

    #[test]
    fn parses_returns_with_optional_line_id() {
        let mut rejects = Vec::new();
        let returns = parse_returns_csv(RETURNS_CSV, "returns-03-2025.csv", &mut rejects).unwrap();
        assert_eq!(returns.len(), 2);
        assert_eq!(returns[0].line_item_id.as_deref(), Some("L1"));
        assert_eq!(returns[1].line_item_id, None);
        assert_eq!(returns[1].return_type, ReturnType::Exchange);

        // unknown return type rejected
        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects[0].order_release_id, "OR9");
    }

    #[test]
    fn settlement_status_is_derived_when_absent() {
        let mut rejects = Vec::new();
        let settlements =
            parse_settlements_csv(SETTLEMENT_CSV, "settlement-03-2025.csv", &mut rejects).unwrap();
        assert_eq!(settlements.len(), 3);
        assert!(rejects.is_empty());

        assert_eq!(settlements[0].status, SettlementStatus::Completed);
        assert_eq!(settlements[1].status, SettlementStatus::Partial);
        assert_eq!(settlements[2].status, SettlementStatus::Pending);
        assert_eq!(settlements[2].settlement_date, None);
    }

    #[test]
    fn missing_required_column_fails_the_file() {
        let mut rejects = Vec::new();
        let err = parse_orders_csv(
            "order release id,order line id\nOR1,L1\n",
            "orders-02-2025.csv",
            &mut rejects,
        )
        .unwrap_err();
        assert!(err.to_string().contains("created on"));
    }

    #[test]
    fn filename_classification() {
        assert_eq!(
            classify_filename("orders-02-2025.csv"),
            Some((RecordKind::Order, MonthKey::new(2, 2025)))
        );
        assert_eq!(
            classify_filename("settlement-12-2024.csv"),
            Some((RecordKind::Settlement, MonthKey::new(12, 2024)))
        );
        assert_eq!(classify_filename("orders-13-2025.csv"), None);
        assert_eq!(classify_filename("notes.txt"), None);
    }

    #[test]
    fn scan_groups_files_by_month() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "orders-02-2025.csv",
            "returns-02-2025.csv",
            "orders-03-2025.csv",
            "ignore.me",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let sets = scan_directory(dir.path()).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].month, MonthKey::new(2, 2025));
        assert!(sets[0].orders.is_some());
        assert!(sets[0].returns.is_some());
        assert!(sets[0].settlements.is_none());
        assert_eq!(sets[1].month, MonthKey::new(3, 2025));
    }

    #[test]
    fn load_batches_assigns_month_order_sequence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("orders-03-2025.csv"),
            "order release id,order line id,created on,order status,final amount,total mrp\n\
             OR2,L1,2025-03-05,DELIVERED,100.00,100.00\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("orders-02-2025.csv"),
            "order release id,order line id,created on,order status,final amount,total mrp\n\
             OR1,L1,2025-02-05,DELIVERED,100.00,100.00\n",
        )
        .unwrap();

        let sets = scan_directory(dir.path()).unwrap();
        let (batches, rejects) = load_batches(&sets).unwrap();
        assert!(rejects.is_empty());
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].month, MonthKey::new(2, 2025));
        assert_eq!(batches[0].sequence, 0);
        assert_eq!(batches[1].month, MonthKey::new(3, 2025));
        assert_eq!(batches[1].sequence, 1);
        assert_eq!(batches[0].orders[0].order_release_id, "OR1");
    }

    #[test]
    fn amount_parsing_tolerates_export_formats() {
        assert_eq!(parse_amount("1499.00"), Some(149_900));
        assert_eq!(parse_amount("₹2,499.50"), Some(249_950));
        assert_eq!(parse_amount("-120.25"), Some(-12_025));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("n/a"), None);
    }
}
