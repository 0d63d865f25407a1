//! SQLite-backed record store
//!
//! One table, one row per service order. `service_order_id` is UNIQUE and
//! every column is NOT NULL; the gateway normalizes rows before they get here.

use crate::error::{QcrError, Result};
use crate::store::{RecordStore, StoredRecord};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

pub struct SqliteRecordStore {
    /// Database file; `None` for in-memory stores
    path: Option<PathBuf>,

    table: String,

    db: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open or create the database file and its table.
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Connection::open(&path)
            .map_err(|e| QcrError::StoreUnavailable(format!("Failed to open database: {}", e)))?;

        let store = Self {
            path: Some(path),
            table: table.to_string(),
            db: Mutex::new(db),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Private in-memory store (tests, dry runs).
    pub fn open_in_memory(table: &str) -> Result<Self> {
        let db = Connection::open_in_memory()?;
        let store = Self {
            path: None,
            table: table.to_string(),
            db: Mutex::new(db),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| QcrError::Store("database connection lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let db = self.connection()?;

        db.execute(
            &format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    service_order_id TEXT NOT NULL UNIQUE,
                    date TEXT NOT NULL,
                    order_id INTEGER NOT NULL,
                    issue_description TEXT NOT NULL,
                    sku INTEGER NOT NULL,
                    sn_code TEXT NOT NULL,
                    customer_account TEXT NOT NULL,
                    product_name TEXT NOT NULL,
                    mtm TEXT NOT NULL,
                    audit_reason TEXT NOT NULL,
                    issue_category TEXT NOT NULL,
                    category TEXT NOT NULL,
                    ingested_at TEXT NOT NULL
                )
                "#,
                table = self.table
            ),
            [],
        )
        .map_err(|e| QcrError::Store(format!("Failed to create table: {}", e)))?;

        db.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_date ON {table}(date)",
                table = self.table
            ),
            [],
        )
        .map_err(|e| QcrError::Store(format!("Failed to create index: {}", e)))?;

        Ok(())
    }

    /// Number of persisted rows.
    pub fn count(&self) -> Result<usize> {
        let db = self.connection()?;
        let count: i64 = db.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl RecordStore for SqliteRecordStore {
    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("sqlite:{}#{}", path.display(), self.table),
            None => format!("sqlite::memory:#{}", self.table),
        }
    }

    fn existing_keys(&self) -> Result<HashSet<String>> {
        let db = self.connection()?;
        let mut stmt = db.prepare(&format!("SELECT service_order_id FROM {}", self.table))?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;
        Ok(keys)
    }

    fn append(&self, rows: &[StoredRecord]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut db = self.connection()?;
        let tx = db.transaction()?;
        let ingested_at = Utc::now().to_rfc3339();
        let mut written = 0usize;

        {
            let mut stmt = tx.prepare(&format!(
                r#"
                INSERT OR IGNORE INTO {} (
                    service_order_id, date, order_id, issue_description, sku, sn_code,
                    customer_account, product_name, mtm, audit_reason, issue_category,
                    category, ingested_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
                self.table
            ))?;

            for row in rows {
                written += stmt.execute(params![
                    row.service_order_id,
                    row.date.format("%Y-%m-%d").to_string(),
                    row.order_id,
                    row.issue_description,
                    row.sku,
                    row.sn_code,
                    row.customer_account,
                    row.product_name,
                    row.mtm,
                    row.audit_reason,
                    row.issue_category,
                    row.category,
                    ingested_at,
                ])?;
            }
        }

        tx.commit()?;
        info!("Appended {} rows to {}", written, self.describe());
        Ok(written)
    }
}
