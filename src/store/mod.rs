//! Persistent store of ingested service orders
//!
//! The store is append-only and keyed by the service order number. Its read
//! path is only used to fetch the set of keys already ingested.

pub mod gateway;
pub mod sqlite;

pub use gateway::{IngestionGateway, PersistOutcome};
pub use sqlite::SqliteRecordStore;

use crate::error::{QcrError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A record normalized for the store's not-null schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub service_order_id: String,
    pub date: NaiveDate,
    pub order_id: i64,
    pub issue_description: String,
    pub sku: i64,
    pub sn_code: String,
    pub customer_account: String,
    pub product_name: String,
    pub mtm: String,
    pub audit_reason: String,
    pub issue_category: String,
    pub category: String,
}

/// Backend behind the ingestion gateway.
pub trait RecordStore {
    /// Human-readable location, for logs
    fn describe(&self) -> String;

    /// Every service order number persisted so far, as stored text.
    fn existing_keys(&self) -> Result<HashSet<String>>;

    /// Append rows; returns how many were written.
    fn append(&self, rows: &[StoredRecord]) -> Result<usize>;
}

/// Stand-in used when the real store could not be opened. Every call fails
/// with [`QcrError::StoreUnavailable`], which the gateway turns into its
/// fail-open behaviour.
#[derive(Debug, Clone)]
pub struct DetachedStore {
    reason: String,
}

impl DetachedStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RecordStore for DetachedStore {
    fn describe(&self) -> String {
        format!("detached ({})", self.reason)
    }

    fn existing_keys(&self) -> Result<HashSet<String>> {
        Err(QcrError::StoreUnavailable(self.reason.clone()))
    }

    fn append(&self, _rows: &[StoredRecord]) -> Result<usize> {
        Err(QcrError::StoreUnavailable(self.reason.clone()))
    }
}
