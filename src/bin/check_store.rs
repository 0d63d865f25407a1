//! Check the record store
//!
//! Run with: cargo run --bin check_store

use qcr_engine::config::PipelineConfig;
use qcr_engine::store::{RecordStore, SqliteRecordStore};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::from_env()?;

    println!("Checking record store...\n");
    println!("  Database: {}", config.store.db_path.display());
    println!("  Table:    {}", config.store.table_name);

    match SqliteRecordStore::open(&config.store.db_path, &config.store.table_name) {
        Ok(store) => {
            let rows = store.count()?;
            let keys = store.existing_keys()?;
            println!("\n  Opened {}", store.describe());
            println!("  Rows stored:          {}", rows);
            println!("  Distinct order keys:  {}", keys.len());
            if rows != keys.len() {
                println!("  WARNING: row count and key count differ");
            }
        }
        Err(e) => {
            eprintln!("\n  Store unavailable: {}", e);
            eprintln!("  Analysis runs will proceed without deduplication.");
            return Err(e.into());
        }
    }

    Ok(())
}
