//! Service Records
//!
//! One row of the return-service spreadsheet, after column aliasing and cell
//! normalization. A [`ResolvedRecord`] wraps a record together with the
//! canonical product name assigned by the identifier resolver.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One service ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Ticket date; `None` when the cell could not be parsed
    pub date: Option<NaiveDate>,

    /// Service order number, the natural dedup key (kept as normalized text)
    pub service_order_id: String,

    pub order_id: String,
    pub issue_description: String,
    pub sku: String,
    pub sn_code: String,
    pub customer_account: String,

    /// Product name as typed in the source sheet (not the canonical name)
    pub product_name: String,

    /// Raw product identifier (machine type model code)
    pub mtm: String,

    pub audit_reason: String,

    /// Fine-grained classification, present in some sheet layouts only
    pub issue_category: Option<String>,

    /// Primary classification used by every analysis
    pub category: String,
}

impl ServiceRecord {
    /// Dedup key as compared against the store: trimmed, not case-folded.
    pub fn business_key(&self) -> &str {
        self.service_order_id.trim()
    }
}

/// A record annotated with its canonical product name. The name is fixed at
/// construction and cannot be re-derived afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    record: ServiceRecord,
    model_name: String,
}

impl ResolvedRecord {
    pub(crate) fn new(record: ServiceRecord, model_name: String) -> Self {
        Self { record, model_name }
    }

    pub fn record(&self) -> &ServiceRecord {
        &self.record
    }

    pub fn into_record(self) -> ServiceRecord {
        self.record
    }

    /// Canonical product name; never empty unless the raw identifier was empty
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Whether the identifier map supplied a name different from the raw code
    pub fn is_mapped(&self) -> bool {
        self.model_name != self.record.mtm
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.record.date
    }

    /// Value of a grouping field, trimmed for exact-match grouping.
    pub fn field(&self, key: GroupKey) -> &str {
        let raw = match key {
            GroupKey::ModelName => self.model_name.as_str(),
            GroupKey::Mtm => self.record.mtm.as_str(),
            GroupKey::AuditReason => self.record.audit_reason.as_str(),
            GroupKey::Category => self.record.category.as_str(),
            GroupKey::IssueCategory => self.record.issue_category.as_deref().unwrap_or(""),
        };
        raw.trim()
    }
}

/// Fields a distribution can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    ModelName,
    Mtm,
    AuditReason,
    Category,
    IssueCategory,
}

impl GroupKey {
    pub fn column_name(&self) -> &'static str {
        match self {
            GroupKey::ModelName => "model_name",
            GroupKey::Mtm => "mtm",
            GroupKey::AuditReason => "audit_reason",
            GroupKey::Category => "category",
            GroupKey::IssueCategory => "issue_category",
        }
    }
}
