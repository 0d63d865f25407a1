//! Ingestion Module
//!
//! Turns spreadsheet exports into normalized [`ServiceRecord`]s:
//! - Static column alias table (historical header names)
//! - Cell normalization (spreadsheet numeric coercion, date formats)
//! - Schema checks that stop the run when the sheet cannot be analysed

pub mod cells;
pub mod columns;
pub mod csv_source;

pub use columns::{lookup_column, ColumnField, ColumnPlan};
pub use csv_source::CsvRecordSource;

use crate::record::ServiceRecord;
use serde::{Deserialize, Serialize};

/// Records read from one source file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordBatch {
    pub source_id: String,

    /// Data rows seen, including blank rows that were skipped
    pub rows_read: usize,

    /// Header cells that matched no alias
    pub ignored_columns: Vec<String>,

    pub records: Vec<ServiceRecord>,
}
