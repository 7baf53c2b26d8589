use std::fs;
use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use report_fs::{FileStoreError, FinalizeOutcome, ReportFileStore};
use report_models::ReportMetadata;
use tempfile::TempDir;

fn sample_meta(report_id: &str, incoming_path: PathBuf) -> ReportMetadata {
    ReportMetadata {
        report_id: report_id.to_string(),
        test_name: "collector_experiment".to_string(),
        probe_asn: "AS1234".to_string(),
        probe_cc: "IT".to_string(),
        platform: String::new(),
        software_name: "collector-tester".to_string(),
        software_version: "0.0.1-dev".to_string(),
        creation_time: Utc.with_ymd_and_hms(2018, 6, 1, 17, 27, 50).unwrap(),
        last_update_time: Utc::now(),
        incoming_path,
        entry_count: 0,
        closed: false,
    }
}

#[test]
fn create_append_finalize_moves_file_to_sync() {
    let tmp = TempDir::new().expect("tempdir");
    let store = ReportFileStore::new(tmp.path()).expect("store");

    let path = store.create("r1").expect("create");
    store.append(&path, b"{\"a\":1}\n").expect("append 1");
    store.append(&path, b"{\"a\":2}\n").expect("append 2");

    let mut meta = sample_meta("r1", path.clone());
    meta.entry_count = 2;
    let outcome = store.finalize(&meta).expect("finalize");

    let sync_path = match outcome {
        FinalizeOutcome::Synced(p) => p,
        other => panic!("expected sync, got {other:?}"),
    };
    assert!(!path.exists());
    assert_eq!(
        sync_path.file_name().and_then(|n| n.to_str()),
        Some("20180601T172750Z-collector_experiment-r1-AS1234-IT-probe-0.2.0.json"),
    );
    let body = fs::read_to_string(&sync_path).expect("read sync file");
    assert_eq!(body, "{\"a\":1}\n{\"a\":2}\n");
}

#[test]
fn finalize_discards_empty_file() {
    let tmp = TempDir::new().expect("tempdir");
    let store = ReportFileStore::new(tmp.path()).expect("store");

    let path = store.create("r1").expect("create");
    let meta = sample_meta("r1", path.clone());
    assert_eq!(
        store.finalize(&meta).expect("finalize"),
        FinalizeOutcome::Discarded,
    );
    assert!(!path.exists());
    assert_eq!(fs::read_dir(store.sync_dir()).expect("read sync").count(), 0);
}

#[test]
fn duplicate_create_is_an_error() {
    let tmp = TempDir::new().expect("tempdir");
    let store = ReportFileStore::new(tmp.path()).expect("store");

    store.create("r1").expect("first create");
    assert!(matches!(
        store.create("r1"),
        Err(FileStoreError::AlreadyExists(_)),
    ));
}

#[test]
fn list_incoming_reports_ids_and_sizes() {
    let tmp = TempDir::new().expect("tempdir");
    let store = ReportFileStore::new(tmp.path()).expect("store");

    let p1 = store.create("a-report").expect("create a");
    store.create("b-report").expect("create b");
    store.append(&p1, b"{}\n").expect("append");

    let files = store.list_incoming().expect("list");
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].report_id, "a-report");
    assert_eq!(files[0].size, 3);
    assert_eq!(files[1].report_id, "b-report");
    assert_eq!(files[1].size, 0);
}

#[test]
fn remove_sync_file_unlinks_archived_report() {
    let tmp = TempDir::new().expect("tempdir");
    let store = ReportFileStore::new(tmp.path()).expect("store");

    let path = store.create("r1").expect("create");
    store.append(&path, b"{}\n").expect("append");
    let meta = sample_meta("r1", path);
    let outcome = store.finalize(&meta).expect("finalize");
    let FinalizeOutcome::Synced(sync_path) = outcome else {
        panic!("expected sync");
    };

    let filename = sync_path.file_name().and_then(|n| n.to_str()).unwrap();
    store.remove_sync_file(filename).expect("remove");
    assert!(!sync_path.exists());
    assert!(store.remove_sync_file(filename).is_err());
}

#[cfg(unix)]
#[test]
fn incoming_files_are_mode_0640() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().expect("tempdir");
    let store = ReportFileStore::new(tmp.path()).expect("store");
    let path = store.create("r1").expect("create");

    let mode = fs::metadata(&path).expect("stat").permissions().mode();
    assert_eq!(mode & 0o777, 0o640);
    let dir_mode = fs::metadata(store.incoming_dir())
        .expect("stat dir")
        .permissions()
        .mode();
    assert_eq!(dir_mode & 0o777, 0o700);
}
