// Master dataset + run snapshot on SQLite

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, Connection, Transaction};

use settleline_engine::model::{
    Financials, LifecycleStatus, MasterRecord, OrderKey, OrderLine, PaymentType, ReturnRecord,
    RunSnapshot, SettlementRecord, SnapshotEntry,
};

use crate::error::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS master_records (
    order_release_id    TEXT NOT NULL,
    line_item_id        TEXT NOT NULL,
    created_on          TEXT NOT NULL,
    order_status        TEXT NOT NULL,
    cancellation_reason TEXT,
    packed_on           TEXT,
    shipped_on          TEXT,
    delivered_on        TEXT,
    final_amount_paise  INTEGER NOT NULL,
    mrp_paise           INTEGER NOT NULL,
    discount_paise      INTEGER NOT NULL,
    shipping_paise      INTEGER NOT NULL,
    payment_type        TEXT NOT NULL,
    city                TEXT,
    state               TEXT,
    return_json         TEXT,
    settlement_json     TEXT,
    status              TEXT,
    profit_paise        INTEGER NOT NULL DEFAULT 0,
    loss_paise          INTEGER NOT NULL DEFAULT 0,
    potential_paise     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (order_release_id, line_item_id)
);

CREATE TABLE IF NOT EXISTS run_snapshot (
    order_release_id TEXT NOT NULL,
    line_item_id     TEXT NOT NULL,
    status           TEXT NOT NULL,
    is_settled       INTEGER NOT NULL,
    PRIMARY KEY (order_release_id, line_item_id)
);

CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const META_SNAPSHOT_AT: &str = "snapshot_committed_at";

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // -- master dataset -----------------------------------------------------

    pub fn load_master(&self) -> Result<Vec<MasterRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT order_release_id, line_item_id, created_on, order_status,
                    cancellation_reason, packed_on, shipped_on, delivered_on,
                    final_amount_paise, mrp_paise, discount_paise, shipping_paise,
                    payment_type, city, state, return_json, settlement_json,
                    status, profit_paise, loss_paise, potential_paise
             FROM master_records
             ORDER BY order_release_id, line_item_id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(RawMasterRow {
                order_release_id: row.get(0)?,
                line_item_id: row.get(1)?,
                created_on: row.get(2)?,
                order_status: row.get(3)?,
                cancellation_reason: row.get(4)?,
                packed_on: row.get(5)?,
                shipped_on: row.get(6)?,
                delivered_on: row.get(7)?,
                final_amount_paise: row.get(8)?,
                mrp_paise: row.get(9)?,
                discount_paise: row.get(10)?,
                shipping_paise: row.get(11)?,
                payment_type: row.get(12)?,
                city: row.get(13)?,
                state: row.get(14)?,
                return_json: row.get(15)?,
                settlement_json: row.get(16)?,
                status: row.get(17)?,
                profit_paise: row.get(18)?,
                loss_paise: row.get(19)?,
                potential_paise: row.get(20)?,
            })
        })?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(decode_master(raw?)?);
        }
        Ok(records)
    }

    /// Replace the master dataset in one transaction.
    pub fn commit_master(&mut self, records: &[MasterRecord]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        write_master(&tx, records)?;
        tx.commit()?;
        Ok(())
    }

    // -- run snapshot -------------------------------------------------------

    /// `None` until a first snapshot has been committed.
    pub fn load_snapshot(&self) -> Result<Option<RunSnapshot>, StoreError> {
        let committed: Option<String> = {
            let mut stmt = self.conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
            let mut rows = stmt.query_map(params![META_SNAPSHOT_AT], |row| row.get(0))?;
            match rows.next() {
                Some(v) => Some(v?),
                None => None,
            }
        };
        if committed.is_none() {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(
            "SELECT order_release_id, line_item_id, status, is_settled FROM run_snapshot",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut snapshot = RunSnapshot::default();
        for row in rows {
            let (release, line, status, settled) = row?;
            let status = LifecycleStatus::from_code(&status).ok_or_else(|| {
                StoreError::Corrupt {
                    table: "run_snapshot".into(),
                    detail: format!("unknown status '{status}'"),
                }
            })?;
            snapshot.entries.insert(
                OrderKey::new(release, line),
                SnapshotEntry {
                    status,
                    is_settled: settled != 0,
                },
            );
        }
        Ok(Some(snapshot))
    }

    /// Replace the snapshot wholesale in one transaction.
    pub fn commit_snapshot(&mut self, snapshot: &RunSnapshot) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        write_snapshot(&tx, snapshot)?;
        tx.commit()?;
        Ok(())
    }

    /// Commit a completed run: master dataset and snapshot together, one
    /// transaction. Either both land or neither does; a failure leaves the
    /// prior state authoritative.
    pub fn commit_run(
        &mut self,
        records: &[MasterRecord],
        snapshot: &RunSnapshot,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        write_master(&tx, records)?;
        write_snapshot(&tx, snapshot)?;
        tx.commit()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row encoding
// ---------------------------------------------------------------------------

struct RawMasterRow {
    order_release_id: String,
    line_item_id: String,
    created_on: String,
    order_status: String,
    cancellation_reason: Option<String>,
    packed_on: Option<String>,
    shipped_on: Option<String>,
    delivered_on: Option<String>,
    final_amount_paise: i64,
    mrp_paise: i64,
    discount_paise: i64,
    shipping_paise: i64,
    payment_type: String,
    city: Option<String>,
    state: Option<String>,
    return_json: Option<String>,
    settlement_json: Option<String>,
    status: Option<String>,
    profit_paise: i64,
    loss_paise: i64,
    potential_paise: i64,
}

fn write_master(tx: &Transaction<'_>, records: &[MasterRecord]) -> Result<(), StoreError> {
    tx.execute("DELETE FROM master_records", [])?;
    let mut stmt = tx.prepare(
        "INSERT INTO master_records (
            order_release_id, line_item_id, created_on, order_status,
            cancellation_reason, packed_on, shipped_on, delivered_on,
            final_amount_paise, mrp_paise, discount_paise, shipping_paise,
            payment_type, city, state, return_json, settlement_json,
            status, profit_paise, loss_paise, potential_paise
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                  ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
    )?;

    for record in records {
        let o = &record.order;
        let return_json = record
            .return_record
            .as_ref()
            .map(|r| serde_json::to_string(r))
            .transpose()
            .map_err(|e| StoreError::Encode(e.to_string()))?;
        let settlement_json = record
            .settlement
            .as_ref()
            .map(|s| serde_json::to_string(s))
            .transpose()
            .map_err(|e| StoreError::Encode(e.to_string()))?;

        stmt.execute(params![
            o.order_release_id,
            o.line_item_id,
            o.created_on.to_string(),
            o.order_status,
            o.cancellation_reason,
            o.packed_on.map(|d| d.to_string()),
            o.shipped_on.map(|d| d.to_string()),
            o.delivered_on.map(|d| d.to_string()),
            o.final_amount_paise,
            o.mrp_paise,
            o.discount_paise,
            o.shipping_paise,
            o.payment_type.as_str(),
            o.city,
            o.state,
            return_json,
            settlement_json,
            record.status.map(|s| s.code()),
            record.financials.profit_paise,
            record.financials.loss_paise,
            record.financials.potential_paise,
        ])?;
    }
    Ok(())
}

fn write_snapshot(tx: &Transaction<'_>, snapshot: &RunSnapshot) -> Result<(), StoreError> {
    tx.execute("DELETE FROM run_snapshot", [])?;
    let mut stmt = tx.prepare(
        "INSERT INTO run_snapshot (order_release_id, line_item_id, status, is_settled)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (key, entry) in &snapshot.entries {
        stmt.execute(params![
            key.order_release_id,
            key.line_item_id,
            entry.status.code(),
            entry.is_settled as i64,
        ])?;
    }
    tx.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![META_SNAPSHOT_AT, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn decode_master(raw: RawMasterRow) -> Result<MasterRecord, StoreError> {
    let corrupt = |detail: String| StoreError::Corrupt {
        table: "master_records".into(),
        detail,
    };

    let payment_type = PaymentType::parse(&raw.payment_type)
        .ok_or_else(|| corrupt(format!("unknown payment type '{}'", raw.payment_type)))?;

    let status = match raw.status {
        None => None,
        Some(s) => Some(
            LifecycleStatus::from_code(&s)
                .ok_or_else(|| corrupt(format!("unknown status '{s}'")))?,
        ),
    };

    let return_record: Option<ReturnRecord> = raw
        .return_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| corrupt(format!("return_json: {e}")))?;
    let settlement: Option<SettlementRecord> = raw
        .settlement_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| corrupt(format!("settlement_json: {e}")))?;

    let order = OrderLine {
        order_release_id: raw.order_release_id.clone(),
        line_item_id: raw.line_item_id.clone(),
        created_on: parse_date(&raw.created_on).ok_or_else(|| {
            corrupt(format!("bad created_on '{}'", raw.created_on))
        })?,
        order_status: raw.order_status,
        cancellation_reason: raw.cancellation_reason,
        packed_on: parse_opt_date(&raw.packed_on, &corrupt)?,
        shipped_on: parse_opt_date(&raw.shipped_on, &corrupt)?,
        delivered_on: parse_opt_date(&raw.delivered_on, &corrupt)?,
        final_amount_paise: raw.final_amount_paise,
        mrp_paise: raw.mrp_paise,
        discount_paise: raw.discount_paise,
        shipping_paise: raw.shipping_paise,
        payment_type,
        city: raw.city,
        state: raw.state,
    };

    Ok(MasterRecord {
        key: OrderKey::new(raw.order_release_id, raw.line_item_id),
        order,
        return_record,
        settlement,
        status,
        financials: Financials {
            profit_paise: raw.profit_paise,
            loss_paise: raw.loss_paise,
            potential_paise: raw.potential_paise,
        },
    })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_opt_date(
    s: &Option<String>,
    corrupt: &impl Fn(String) -> StoreError,
) -> Result<Option<NaiveDate>, StoreError> {
    match s {
        None => Ok(None),
        Some(s) => parse_date(s)
            .map(Some)
            .ok_or_else(|| corrupt(format!("bad date '{s}'"))),
    }
}
