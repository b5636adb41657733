use crate::data::{Error, Record, RecordId, SubPosting, DEFAULT_CURRENCY};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

/// One raw line of the CSV export. A row with a non-empty `parent` column is
/// a sub-posting of an earlier split row rather than a transaction of its
/// own; the exporter always writes the parent row first.
#[derive(Debug, Deserialize)]
struct RawRow {
    id: RecordId,
    date: String,
    account: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    payee: String,
    amount: Decimal,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    note: String,
    #[serde(default)]
    parent: Option<RecordId>,
    #[serde(default)]
    transfer_account: String,
}

/// Simple CSV importer for export `Record`s. Malformed rows are reported and
/// skipped (never coerced into a record); a duplicate id is fatal because it
/// would break deduplication downstream.
pub(crate) fn read_records<R: std::io::Read>(reader: R) -> Result<Vec<Record>, anyhow::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records: Vec<Record> = Vec::new();
    let mut by_id: HashMap<RecordId, usize> = HashMap::new();
    for result in rdr.deserialize() {
        let mut row: RawRow = match result {
            Ok(row) => row,
            Err(e) => {
                warn!("skipping malformed export row: {e}");
                continue;
            }
        };
        row.amount.rescale(2);
        if let Some(parent) = row.parent {
            match by_id.get(&parent) {
                Some(&idx) => records[idx].splits.push(SubPosting {
                    category: row.category,
                    amount: row.amount,
                }),
                None => warn!(id = row.id, parent, "skipping sub-posting without a parent record"),
            }
            continue;
        }
        if by_id.contains_key(&row.id) {
            return Err(Error::DuplicateRecord(row.id).into());
        }
        let timestamp = match parse_timestamp(&row.date) {
            Some(ts) => ts,
            None => {
                warn!(id = row.id, date = %row.date, "skipping record with unparseable timestamp");
                continue;
            }
        };
        by_id.insert(row.id, records.len());
        records.push(Record {
            id: row.id,
            timestamp,
            amount: row.amount,
            account: row.account,
            category: row.category,
            transfer_account: non_empty(row.transfer_account),
            payee: non_empty(row.payee),
            note: non_empty(row.note),
            currency: if row.currency.is_empty() {
                DEFAULT_CURRENCY.to_string()
            } else {
                row.currency
            },
            splits: Vec::new(),
        });
    }
    Ok(records)
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
