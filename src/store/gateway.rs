//! Ingestion Store Gateway
//!
//! `filter_new` answers "which of these have we never seen" against the store
//! as it is right now; `persist` appends the new records. Neither blocks the
//! analysis path: an unreachable store means no deduplication, and a failed
//! write is logged and reported in the [`PersistOutcome`].

use crate::config::StoreConfig;
use crate::error::Result;
use crate::ingestion::cells::{normalize_identifier, parse_integer};
use crate::record::ServiceRecord;
use crate::store::{DetachedStore, RecordStore, SqliteRecordStore, StoredRecord};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const UNKNOWN: &str = "unknown";
pub const NO_DESCRIPTION: &str = "no description";
pub const UNCATEGORIZED: &str = "uncategorized";

pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MAX_PRODUCT_NAME_LEN: usize = 200;
pub const MAX_TEXT_LEN: usize = 100;

/// Cell contents that mean "no value" in exported sheets.
const NULL_TOKENS: &[&str] = &["nan", "NaN", "None", "<NA>", "null", "NULL"];

/// Result of one `persist` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistOutcome {
    pub run_id: Uuid,

    /// Records handed to `persist`
    pub attempted: usize,

    /// Rows the store accepted
    pub written: usize,

    /// Records whose business key is empty or not positive
    pub dropped_invalid: usize,

    /// Repeats of a key already seen earlier in the same batch
    pub duplicates_in_batch: usize,

    /// Set when the write failed; nothing was written in that case
    pub error: Option<String>,
}

impl PersistOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct IngestionGateway {
    store: Box<dyn RecordStore>,

    /// Date stamped on records that arrive without one
    ingest_date: NaiveDate,
}

impl IngestionGateway {
    pub fn new(store: Box<dyn RecordStore>) -> Self {
        Self {
            store,
            ingest_date: Local::now().date_naive(),
        }
    }

    /// Open the configured sqlite store. If that fails the gateway is still
    /// built, over a [`DetachedStore`], and every call takes the fail-open path.
    pub fn connect(config: &StoreConfig) -> Self {
        match SqliteRecordStore::open(&config.db_path, &config.table_name) {
            Ok(store) => {
                info!("Record store ready: {}", store.describe());
                Self::new(Box::new(store))
            }
            Err(e) => {
                warn!(
                    "Record store '{}' unavailable, deduplication disabled for this run: {}",
                    config.db_path.display(),
                    e
                );
                Self::new(Box::new(DetachedStore::new(e.to_string())))
            }
        }
    }

    pub fn with_ingest_date(mut self, date: NaiveDate) -> Self {
        self.ingest_date = date;
        self
    }

    pub fn describe(&self) -> String {
        self.store.describe()
    }

    /// Keys currently persisted, in [`store_key`] form.
    pub fn known_keys(&self) -> Result<HashSet<String>> {
        let keys = self.store.existing_keys()?;
        Ok(keys.iter().map(|k| store_key(k)).collect())
    }

    /// Candidates whose key is not in the store. The key set is fetched on
    /// every call. If the store cannot be read, every candidate is new.
    pub fn filter_new<T, F>(&self, candidates: Vec<T>, key: F) -> Vec<T>
    where
        F: Fn(&T) -> &str,
    {
        let known = match self.known_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(
                    "Failed to read existing keys from {} ({}); treating all {} candidates as new",
                    self.store.describe(),
                    e,
                    candidates.len()
                );
                return candidates;
            }
        };

        let total = candidates.len();
        let fresh: Vec<T> = candidates
            .into_iter()
            .filter(|c| !known.contains(&store_key(key(c))))
            .collect();

        info!(
            "Dedup: {} candidates, {} new, {} already known",
            total,
            fresh.len(),
            total - fresh.len()
        );
        fresh
    }

    /// Normalize and append records. Never propagates a failure.
    pub fn persist<'a, I>(&self, records: I) -> PersistOutcome
    where
        I: IntoIterator<Item = &'a ServiceRecord>,
    {
        let mut outcome = PersistOutcome {
            run_id: Uuid::new_v4(),
            attempted: 0,
            written: 0,
            dropped_invalid: 0,
            duplicates_in_batch: 0,
            error: None,
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut rows: Vec<StoredRecord> = Vec::new();
        for record in records {
            outcome.attempted += 1;
            let Some(row) = self.normalize(record) else {
                debug!("Dropping record with invalid key '{}'", record.service_order_id);
                outcome.dropped_invalid += 1;
                continue;
            };
            if !seen.insert(row.service_order_id.clone()) {
                outcome.duplicates_in_batch += 1;
                continue;
            }
            rows.push(row);
        }

        match self.store.append(&rows) {
            Ok(written) => outcome.written = written,
            Err(e) => {
                error!(
                    "Persist run {} to {} failed: {}",
                    outcome.run_id,
                    self.store.describe(),
                    e
                );
                outcome.error = Some(e.to_string());
            }
        }

        info!(
            "Persist run {}: {} attempted, {} written, {} dropped invalid, {} in-batch duplicates",
            outcome.run_id,
            outcome.attempted,
            outcome.written,
            outcome.dropped_invalid,
            outcome.duplicates_in_batch
        );
        outcome
    }

    /// Map a record onto the store's not-null schema. `None` when its
    /// business key is not persistable.
    pub fn normalize(&self, record: &ServiceRecord) -> Option<StoredRecord> {
        let key = persistable_key(&record.service_order_id)?;

        Some(StoredRecord {
            service_order_id: key,
            date: record.date.unwrap_or(self.ingest_date),
            order_id: numeric_or_zero(&record.order_id),
            issue_description: text_or(
                &record.issue_description,
                NO_DESCRIPTION,
                MAX_DESCRIPTION_LEN,
            ),
            sku: numeric_or_zero(&record.sku),
            sn_code: text_or(&record.sn_code, UNKNOWN, MAX_TEXT_LEN),
            customer_account: text_or(&record.customer_account, UNKNOWN, MAX_TEXT_LEN),
            product_name: text_or(&record.product_name, UNKNOWN, MAX_PRODUCT_NAME_LEN),
            mtm: text_or(&record.mtm, UNKNOWN, MAX_TEXT_LEN),
            audit_reason: text_or(&record.audit_reason, UNKNOWN, MAX_TEXT_LEN),
            issue_category: text_or(
                record.issue_category.as_deref().unwrap_or(""),
                UNCATEGORIZED,
                MAX_TEXT_LEN,
            ),
            category: text_or(&record.category, UNCATEGORIZED, MAX_TEXT_LEN),
        })
    }
}

/// A business key as the store holds it: normalized, then cut to the column
/// width. Lookups and writes both go through this, so a key matches itself
/// after a round trip whatever its length.
pub fn store_key(raw: &str) -> String {
    truncate_chars(&normalize_identifier(raw), MAX_TEXT_LEN)
}

/// [`store_key`], or `None` if it is empty or a non-positive number.
/// Alphanumeric keys are accepted as-is.
pub fn persistable_key(raw: &str) -> Option<String> {
    let key = store_key(raw);
    if key.is_empty() || NULL_TOKENS.contains(&key.as_str()) {
        return None;
    }
    match key.parse::<f64>() {
        Ok(value) if !value.is_finite() || value <= 0.0 => None,
        _ => Some(key),
    }
}

fn numeric_or_zero(raw: &str) -> i64 {
    parse_integer(raw).unwrap_or(0)
}

fn text_or(raw: &str, sentinel: &str, max_len: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || NULL_TOKENS.contains(&trimmed) {
        return sentinel.to_string();
    }
    truncate_chars(trimmed, max_len)
}

fn truncate_chars(value: &str, max_len: usize) -> String {
    value.chars().take(max_len).collect()
}
