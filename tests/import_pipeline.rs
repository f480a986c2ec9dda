//! End-to-end pipeline tests over the library API: archive in, rows out.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use pulseline::models::IngestSource;
use pulseline::pipeline::{self, ImportOptions};
use pulseline::progress::NoProgress;
use pulseline::store::Store;
use pulseline::{db, migrate};

async fn test_store(tmp: &TempDir) -> Store {
    let pool = db::connect(&tmp.path().join("data/pulse.sqlite"))
        .await
        .unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    Store::new(pool)
}

fn build_zip(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let zip_path = dir.join(name);
    let file = fs::File::create(&zip_path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (entry_name, content) in entries {
        writer.start_file(*entry_name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
    zip_path
}

async fn import(store: &Store, archive: &Path) -> pulseline::report::ImportSummary {
    pipeline::import_archive(store, archive, &ImportOptions::default(), &NoProgress)
        .await
        .unwrap()
}

const SLEEP_JSON: &[u8] = br#"{
    "calendarDate": "2024-01-15",
    "deepSleepSeconds": 7200,
    "lightSleepSeconds": 18000,
    "remSleepSeconds": 3600
}"#;

#[tokio::test]
async fn end_to_end_sleep_scenario() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;
    let archive = build_zip(
        tmp.path(),
        "export.zip",
        &[("DI_CONNECT/sleep_2024-01-15.json", SLEEP_JSON)],
    );

    let summary = import(&store, &archive).await;
    assert!(summary.success);
    assert_eq!(summary.total_records_inserted, 1);

    let (date, deep, light, rem): (String, i64, i64, i64) = sqlx::query_as(
        "SELECT date, deep_sleep_seconds, light_sleep_seconds, rem_sleep_seconds FROM sleep_records",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(date, "2024-01-15");
    assert_eq!(deep, 7200);
    assert_eq!(light, 18000);
    assert_eq!(rem, 3600);
}

#[tokio::test]
async fn reimport_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;
    let archive = build_zip(
        tmp.path(),
        "export.zip",
        &[
            ("DI_CONNECT/sleep_2024-01-15.json", SLEEP_JSON),
            (
                "DI_CONNECT/UdsFile_2024-01-16.json",
                br#"{"calendarDate": "2024-01-16", "totalSteps": 12000}"#,
            ),
        ],
    );

    let first = import(&store, &archive).await;
    assert_eq!(first.total_files_processed, 2);
    assert_eq!(first.total_records_inserted, 2);

    let second = import(&store, &archive).await;
    assert_eq!(second.total_records_inserted, 0);
    assert_eq!(second.duplicates_skipped, 2);
    assert!(second.success);

    let sleep_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sleep_records")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(sleep_rows, 1);
}

#[tokio::test]
async fn same_identity_key_updates_in_place() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let first = build_zip(
        tmp.path(),
        "first.zip",
        &[("DI_CONNECT/sleep_2024-01-15.json", SLEEP_JSON)],
    );
    // Same night, revised values — different bytes, same identity key.
    let revised = build_zip(
        tmp.path(),
        "revised.zip",
        &[(
            "DI_CONNECT/sleep_2024-01-15.json",
            br#"{"calendarDate": "2024-01-15", "deepSleepSeconds": 5400, "lightSleepSeconds": 19000, "remSleepSeconds": 4000}"#,
        )],
    );

    import(&store, &first).await;
    let summary = import(&store, &revised).await;
    assert_eq!(summary.total_records_inserted, 0);
    assert_eq!(summary.records_updated, 1);

    let (count, deep): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), MAX(deep_sleep_seconds) FROM sleep_records",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(count, 1);
    assert_eq!(deep, 5400);
}

#[tokio::test]
async fn categorization_scenario() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;
    let archive = build_zip(
        tmp.path(),
        "export.zip",
        &[
            ("sleep_2024-01-15.json", SLEEP_JSON),
            (
                "UdsFile_2024-01-16.json",
                br#"{"calendarDate": "2024-01-16", "totalSteps": 9000}"#.as_slice(),
            ),
            ("activity.fit", b"binary payload".as_slice()),
        ],
    );

    let summary = import(&store, &archive).await;
    assert_eq!(summary.total_files_found, 3);
    assert_eq!(summary.by_category["sleep"].found, 1);
    assert_eq!(summary.by_category["daily_summary"].found, 1);
    assert_eq!(summary.by_category["fit"].found, 1);
}

#[tokio::test]
async fn malformed_json_leaves_no_ledger_row() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;
    let archive = build_zip(
        tmp.path(),
        "export.zip",
        &[("DI_CONNECT/sleep_2024-01-15.json", b"{invalid json".as_slice())],
    );

    let summary = import(&store, &archive).await;
    assert!(!summary.success);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.error_details.len(), 1);
    assert!(summary.error_details[0].file.contains("sleep_2024-01-15.json"));

    // No ledger row for the bad file, so a corrected re-upload goes through.
    let ledger_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM imported_files")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(ledger_rows, 0);

    let corrected = build_zip(
        tmp.path(),
        "corrected.zip",
        &[("DI_CONNECT/sleep_2024-01-15.json", SLEEP_JSON)],
    );
    let retry = import(&store, &corrected).await;
    assert!(retry.success);
    assert_eq!(retry.total_records_inserted, 1);
}

#[tokio::test]
async fn uncategorized_json_is_left_alone() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;
    let archive = build_zip(
        tmp.path(),
        "export.zip",
        &[
            ("DI_CONNECT/sleep_2024-01-15.json", SLEEP_JSON),
            ("DI_CONNECT/account_metadata.json", b"{}".as_slice()),
        ],
    );

    let summary = import(&store, &archive).await;
    assert!(summary.success);
    assert_eq!(summary.total_files_found, 2);
    assert_eq!(summary.by_category["other"].found, 1);
    // The uncategorized file is neither processed nor an error.
    assert_eq!(summary.total_files_processed, 1);
    assert_eq!(summary.errors, 0);
}

#[tokio::test]
async fn missing_archive_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;
    let result = pipeline::import_archive(
        &store,
        &tmp.path().join("absent.zip"),
        &ImportOptions::default(),
        &NoProgress,
    )
    .await;
    assert!(matches!(result, Err(pulseline::error::Error::NotFound(_))));
}

#[tokio::test]
async fn corrupt_archive_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;
    let bad = tmp.path().join("corrupt.zip");
    fs::write(&bad, b"not a zip").unwrap();

    let result =
        pipeline::import_archive(&store, &bad, &ImportOptions::default(), &NoProgress).await;
    assert!(matches!(
        result,
        Err(pulseline::error::Error::InvalidArchive(_))
    ));
}

#[tokio::test]
async fn manual_folder_import_tags_source() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;

    let folder = tmp.path().join("fit-folder");
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join("broken.fit"), b"junk").unwrap();

    let summary = pipeline::import_fit_folder(&store, &folder, &NoProgress)
        .await
        .unwrap();
    assert_eq!(summary.total_files_found, 1);
    assert_eq!(summary.errors, 1);
    assert!(!summary.success);

    // A parse failure must not leave a ledger row behind.
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM imported_files")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(rows, 0);

    // Manual ingest of a parsed file is tagged with its source.
    let parsed = pulseline::models::ParsedFile {
        path: folder.join("virtual.fit"),
        kind: pulseline::models::FileKind::Fit,
        category: pulseline::models::Category::Other,
        content_hash: "manual-hash".to_string(),
        file_size: 4,
        modified_time: 0,
        records: Vec::new(),
    };
    store.ingest(&parsed, IngestSource::Manual).await.unwrap();
    let source: String =
        sqlx::query_scalar("SELECT source FROM imported_files WHERE content_hash = 'manual-hash'")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(source, "manual");
}

#[tokio::test]
async fn progress_counts_are_monotonic() {
    use pulseline::progress::{ProgressEvent, ProgressReporter};
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<u64>>);
    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            if let ProgressEvent::Ingesting { n, .. } = event {
                self.0.lock().unwrap().push(n);
            }
        }
    }

    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp).await;
    let archive = build_zip(
        tmp.path(),
        "export.zip",
        &[
            ("DI_CONNECT/sleep_2024-01-14.json", SLEEP_JSON),
            (
                "DI_CONNECT/sleep_2024-01-15.json",
                br#"{"calendarDate": "2024-01-16", "deepSleepSeconds": 100}"#.as_slice(),
            ),
            (
                "DI_CONNECT/UdsFile_2024-01-16.json",
                br#"{"calendarDate": "2024-01-16", "totalSteps": 100}"#.as_slice(),
            ),
        ],
    );

    let recorder = Recorder(Mutex::new(Vec::new()));
    pipeline::import_archive(&store, &archive, &ImportOptions::default(), &recorder)
        .await
        .unwrap();

    let counts = recorder.0.into_inner().unwrap();
    assert_eq!(counts.len(), 3);
    assert!(counts.windows(2).all(|w| w[0] < w[1]), "counts: {:?}", counts);
}
