use qcr_engine::config::StoreConfig;
use qcr_engine::record::ServiceRecord;
use qcr_engine::store::{DetachedStore, IngestionGateway, RecordStore, SqliteRecordStore};
use std::collections::HashSet;
use tempfile::TempDir;

fn record(id: &str) -> ServiceRecord {
    ServiceRecord {
        service_order_id: id.to_string(),
        category: "hinge".to_string(),
        ..Default::default()
    }
}

fn ids(records: &[ServiceRecord]) -> Vec<&str> {
    records.iter().map(|r| r.business_key()).collect()
}

#[test]
fn test_only_unseen_keys_are_new_and_persisted() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig {
        db_path: temp_dir.path().join("qcr.db"),
        table_name: "qcr_data".to_string(),
    };

    let gateway = IngestionGateway::connect(&config);
    let seeded = gateway.persist(&[record("S100")]);
    assert_eq!(seeded.written, 1);

    let fresh = gateway.filter_new(vec![record("S100"), record("S101")], |r| r.business_key());
    assert_eq!(ids(&fresh), vec!["S101"]);

    let outcome = gateway.persist(&fresh);
    assert!(outcome.is_ok());
    assert_eq!(outcome.written, 1);

    let expected: HashSet<String> = ["S100", "S101"].iter().map(|s| s.to_string()).collect();
    assert_eq!(gateway.known_keys().unwrap(), expected);
}

#[test]
fn test_store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig {
        db_path: temp_dir.path().join("qcr.db"),
        table_name: "qcr_data".to_string(),
    };

    IngestionGateway::connect(&config).persist(&[record("1001"), record("1002")]);

    let reopened = IngestionGateway::connect(&config);
    let fresh = reopened.filter_new(
        vec![record("1001.0"), record(" 1002 "), record("1003")],
        |r| r.business_key(),
    );
    assert_eq!(ids(&fresh), vec!["1003"]);
}

#[test]
fn test_overlong_key_stays_known_across_runs() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig {
        db_path: temp_dir.path().join("qcr.db"),
        table_name: "qcr_data".to_string(),
    };
    let long_key = format!("SO-{}", "4".repeat(117));

    let first_run = IngestionGateway::connect(&config);
    let fresh = first_run.filter_new(vec![record(&long_key)], |r| r.business_key());
    assert_eq!(first_run.persist(&fresh).written, 1);

    let second_run = IngestionGateway::connect(&config);
    let fresh = second_run.filter_new(vec![record(&long_key)], |r| r.business_key());
    assert!(fresh.is_empty());
}

#[test]
fn test_unreachable_store_fails_open() {
    let gateway = IngestionGateway::new(Box::new(DetachedStore::new("connection refused")));

    let fresh = gateway.filter_new(vec![record("S200")], |r| r.business_key());
    assert_eq!(ids(&fresh), vec!["S200"]);

    let outcome = gateway.persist(&fresh);
    assert_eq!(outcome.written, 0);
    assert!(outcome.error.is_some());
}

#[test]
fn test_unopenable_path_degrades_to_detached() {
    let temp_dir = TempDir::new().unwrap();
    // A directory cannot be opened as a database file
    let config = StoreConfig {
        db_path: temp_dir.path().to_path_buf(),
        table_name: "qcr_data".to_string(),
    };

    let gateway = IngestionGateway::connect(&config);
    assert!(gateway.describe().starts_with("detached"));
    assert_eq!(gateway.filter_new(vec![record("7")], |r| r.business_key()).len(), 1);
}

#[test]
fn test_repeated_batches_never_persist_a_key_twice() {
    let store = SqliteRecordStore::open_in_memory("qcr_data").unwrap();
    let gateway = IngestionGateway::new(Box::new(store));

    let batches = vec![
        vec!["10", "11", "12"],
        vec!["11", "12", "13", "13"],
        vec!["10", "14"],
    ];

    let mut persisted: HashSet<String> = HashSet::new();
    for batch in batches {
        let candidates: Vec<ServiceRecord> = batch.iter().map(|id| record(id)).collect();
        let fresh = gateway.filter_new(candidates, |r| r.business_key());
        let fresh_keys: HashSet<String> =
            fresh.iter().map(|r| r.business_key().to_string()).collect();

        gateway.persist(&fresh);
        let after = gateway.known_keys().unwrap();

        let added: HashSet<String> = after.difference(&persisted).cloned().collect();
        assert_eq!(added, fresh_keys);
        persisted = after;
    }

    assert_eq!(persisted.len(), 5);
}

#[test]
fn test_detached_store_reports_unavailable() {
    let store = DetachedStore::new("offline");
    assert!(store.existing_keys().is_err());
    assert!(store.describe().contains("offline"));
}
