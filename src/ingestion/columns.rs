//! Column aliasing - historical header names mapped to one canonical field

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical record fields a spreadsheet column can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnField {
    Date,
    ServiceOrderId,
    OrderId,
    IssueDescription,
    Sku,
    SnCode,
    CustomerAccount,
    ProductName,
    Mtm,
    AuditReason,
    IssueCategory,
    Category,
}

impl ColumnField {
    pub fn canonical_name(&self) -> &'static str {
        match self {
            ColumnField::Date => "date",
            ColumnField::ServiceOrderId => "service_order_id",
            ColumnField::OrderId => "order_id",
            ColumnField::IssueDescription => "issue_description",
            ColumnField::Sku => "sku",
            ColumnField::SnCode => "sn_code",
            ColumnField::CustomerAccount => "customer_account",
            ColumnField::ProductName => "product_name",
            ColumnField::Mtm => "mtm",
            ColumnField::AuditReason => "audit_reason",
            ColumnField::IssueCategory => "issue_category",
            ColumnField::Category => "category",
        }
    }
}

lazy_static! {
    /// Header alias table. Keys are lower-cased; lookups lower-case the header
    /// first, which leaves CJK headers untouched.
    static ref COLUMN_ALIASES: HashMap<&'static str, ColumnField> = {
        let mut m = HashMap::new();
        for (alias, field) in [
            ("服务单号", ColumnField::ServiceOrderId),
            ("service_order_id", ColumnField::ServiceOrderId),
            ("service order id", ColumnField::ServiceOrderId),
            ("日期", ColumnField::Date),
            ("审核日期", ColumnField::Date),
            ("date", ColumnField::Date),
            ("订单号", ColumnField::OrderId),
            ("order_id", ColumnField::OrderId),
            ("问题描述", ColumnField::IssueDescription),
            ("issue_description", ColumnField::IssueDescription),
            ("description", ColumnField::IssueDescription),
            ("sku", ColumnField::Sku),
            ("sn编码", ColumnField::SnCode),
            ("sn", ColumnField::SnCode),
            ("sn_code", ColumnField::SnCode),
            ("客户账号", ColumnField::CustomerAccount),
            ("客户账户", ColumnField::CustomerAccount),
            ("customer_account", ColumnField::CustomerAccount),
            ("商品名称", ColumnField::ProductName),
            ("产品名称", ColumnField::ProductName),
            ("product_name", ColumnField::ProductName),
            ("mtm", ColumnField::Mtm),
            ("审核原因", ColumnField::AuditReason),
            ("audit_reason", ColumnField::AuditReason),
            ("问题分类", ColumnField::IssueCategory),
            ("issue_category", ColumnField::IssueCategory),
            ("分类", ColumnField::Category),
            ("category", ColumnField::Category),
        ] {
            m.insert(alias, field);
        }
        m
    };
}

/// Resolve one header cell to its canonical field.
pub fn lookup_column(header: &str) -> Option<ColumnField> {
    let key = header.trim().to_lowercase();
    COLUMN_ALIASES.get(key.as_str()).copied()
}

/// Column-index to field plan, built once per file.
#[derive(Debug, Clone)]
pub struct ColumnPlan {
    slots: Vec<Option<ColumnField>>,
    ignored: Vec<String>,
}

impl ColumnPlan {
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut slots = Vec::new();
        let mut ignored = Vec::new();
        let mut seen: Vec<ColumnField> = Vec::new();

        for header in headers {
            match lookup_column(header) {
                // Two historical names for the same field: the leftmost wins
                Some(field) if !seen.contains(&field) => {
                    seen.push(field);
                    slots.push(Some(field));
                }
                _ => {
                    ignored.push(header.trim().to_string());
                    slots.push(None);
                }
            }
        }

        Self { slots, ignored }
    }

    pub fn has(&self, field: ColumnField) -> bool {
        self.slots.iter().any(|slot| *slot == Some(field))
    }

    pub fn field_at(&self, index: usize) -> Option<ColumnField> {
        self.slots.get(index).copied().flatten()
    }

    pub fn width(&self) -> usize {
        self.slots.len()
    }

    /// Headers that matched no alias (or duplicated an earlier one)
    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }
}
