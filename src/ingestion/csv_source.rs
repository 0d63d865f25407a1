//! CSV Source - reads a spreadsheet export into service records

use crate::error::{QcrError, Result};
use crate::ingestion::cells::{normalize_identifier, parse_date};
use crate::ingestion::columns::{ColumnField, ColumnPlan};
use crate::ingestion::RecordBatch;
use crate::record::ServiceRecord;
use csv::ReaderBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Reads one CSV export of the service-ticket sheet.
pub struct CsvRecordSource {
    source_id: String,
    path: Option<PathBuf>,
    csv_text: Option<String>,
}

impl CsvRecordSource {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            source_id: path.display().to_string(),
            path: Some(path),
            csv_text: None,
        }
    }

    /// Wrap CSV text that is already in memory (uploads, tests).
    pub fn from_text(source_id: impl Into<String>, csv_text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            path: None,
            csv_text: Some(csv_text.into()),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Read and normalize every row.
    ///
    /// Hard stops: no date column, no classification column, or no data rows.
    /// Bad cells never abort the batch.
    pub fn load(&self) -> Result<RecordBatch> {
        let text = match (&self.csv_text, &self.path) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => {
                return Err(QcrError::Config(format!(
                    "source '{}' has neither a path nor inline text",
                    self.source_id
                )))
            }
        };
        // Spreadsheet exports often carry a UTF-8 BOM
        let text = text.trim_start_matches('\u{feff}');

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = rdr.headers()?.clone();
        let plan = ColumnPlan::from_headers(headers.iter());

        if !plan.has(ColumnField::Date) {
            return Err(QcrError::Schema(format!(
                "'{}' has no date column",
                self.source_id
            )));
        }
        if !plan.has(ColumnField::Category) {
            return Err(QcrError::Schema(format!(
                "'{}' has no classification column",
                self.source_id
            )));
        }
        if !plan.ignored().is_empty() {
            debug!("Ignoring unrecognised columns: {:?}", plan.ignored());
        }

        let mut records = Vec::new();
        let mut undated = 0usize;
        let mut rows_read = 0usize;

        for row in rdr.records() {
            let row = row?;
            rows_read += 1;
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }

            let record = Self::build_record(&plan, &row);
            if record.date.is_none() {
                undated += 1;
            }
            records.push(record);
        }

        if records.is_empty() {
            return Err(QcrError::EmptyInput(self.source_id.clone()));
        }
        if undated > 0 {
            warn!(
                "{} of {} rows in '{}' have an unparsable date",
                undated,
                records.len(),
                self.source_id
            );
        }
        info!("Read {} records from '{}'", records.len(), self.source_id);

        Ok(RecordBatch {
            source_id: self.source_id.clone(),
            rows_read,
            ignored_columns: plan.ignored().to_vec(),
            records,
        })
    }

    fn build_record(plan: &ColumnPlan, row: &csv::StringRecord) -> ServiceRecord {
        let mut record = ServiceRecord::default();

        for (idx, cell) in row.iter().enumerate() {
            let Some(field) = plan.field_at(idx) else {
                continue;
            };
            match field {
                ColumnField::Date => record.date = parse_date(cell),
                ColumnField::ServiceOrderId => record.service_order_id = normalize_identifier(cell),
                ColumnField::OrderId => record.order_id = normalize_identifier(cell),
                ColumnField::Sku => record.sku = normalize_identifier(cell),
                ColumnField::IssueDescription => record.issue_description = cell.trim().to_string(),
                ColumnField::SnCode => record.sn_code = cell.trim().to_string(),
                ColumnField::CustomerAccount => record.customer_account = cell.trim().to_string(),
                ColumnField::ProductName => record.product_name = cell.trim().to_string(),
                ColumnField::Mtm => record.mtm = cell.trim().to_string(),
                ColumnField::AuditReason => record.audit_reason = cell.trim().to_string(),
                ColumnField::IssueCategory => {
                    let value = cell.trim();
                    record.issue_category = (!value.is_empty()).then(|| value.to_string());
                }
                ColumnField::Category => record.category = cell.trim().to_string(),
            }
        }

        record
    }
}
