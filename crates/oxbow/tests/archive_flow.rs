//! End-to-end pipeline behavior over an in-memory object store and a
//! stubbed batch source: exhaustion termination, batch sequencing and
//! resume, and the restore-side normalization of what backup wrote.

use std::io::{Read, Write};
use std::sync::Arc;

use chrono::NaiveDate;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use object_store::memory::InMemory;
use object_store::{ObjectStore, PutPayload};

use async_trait::async_trait;
use oxbow::codec::Field;
use oxbow::restore::fetch_and_normalize;
use oxbow::window::{ArchiveKey, MonthWindow};
use oxbow::{BackupParams, BatchSource, Result, Row, run_backup};

/// A month's worth of rows, handed out in timestamp order like the real
/// selector, with delete-on-select semantics and a counted control
/// sequence.
struct StubSource {
    remaining: Vec<Row>,
    last_committed_seq: i64,
    select_calls: u64,
}

impl StubSource {
    fn with_rows(n: usize) -> Self {
        let rows = (0..n)
            .map(|i| {
                vec![
                    Field::Int(i as i64),
                    Field::Text(format!("row-{}", i)),
                    Field::Timestamp(
                        NaiveDate::from_ymd_opt(2022, 3, 1)
                            .unwrap()
                            .and_hms_opt(0, 0, i as u32 % 60)
                            .unwrap(),
                    ),
                ]
            })
            .collect();
        Self {
            remaining: rows,
            last_committed_seq: 0,
            select_calls: 0,
        }
    }
}

#[async_trait]
impl BatchSource for StubSource {
    async fn columns(&mut self, _table: &str) -> Result<Vec<String>> {
        Ok(vec![
            "id".to_string(),
            "name".to_string(),
            "created_at".to_string(),
        ])
    }

    async fn last_sequence(&mut self, _table: &str, _window: &MonthWindow) -> Result<i64> {
        Ok(self.last_committed_seq)
    }

    async fn take_batch(
        &mut self,
        _table: &str,
        _ts_column: &str,
        _window: &MonthWindow,
        seq: i64,
        limit: i64,
    ) -> Result<Vec<Row>> {
        self.select_calls += 1;
        let take = (limit as usize).min(self.remaining.len());
        let batch: Vec<Row> = self.remaining.drain(..take).collect();
        if !batch.is_empty() {
            self.last_committed_seq = seq;
        }
        Ok(batch)
    }
}

fn params(batch_size: i64) -> BackupParams {
    BackupParams {
        table: "events".to_string(),
        timestamp_column: "created_at".to_string(),
        batch_size,
        start: NaiveDate::from_ymd_opt(2022, 3, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2022, 3, 31).unwrap(),
    }
}

#[tokio::test]
async fn partial_final_batch_produces_k_plus_one_files() {
    // 25 rows, batch size 10: three files of 10, 10, 5; four selections.
    let mut source = StubSource::with_rows(25);
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());

    let summary = run_backup(&mut source, &store, &params(10)).await.unwrap();

    assert_eq!(summary.rows, 25);
    assert_eq!(summary.batches, 3);
    assert_eq!(source.select_calls, 4);
    assert_eq!(
        summary.archives,
        vec![
            "db_backup/events/2022-03/backup_2022-03_batch1.csv.gz",
            "db_backup/events/2022-03/backup_2022-03_batch2.csv.gz",
            "db_backup/events/2022-03/backup_2022-03_batch3.csv.gz",
        ]
    );
    assert!(source.remaining.is_empty());

    // The final file holds exactly the 5-row remainder.
    let stored = store
        .get(&object_store::path::Path::from(summary.archives[2].as_str()))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let mut text = String::new();
    GzDecoder::new(&stored[..]).read_to_string(&mut text).unwrap();
    assert_eq!(text.lines().count(), 6); // header + 5 rows
    assert!(text.starts_with("\"ID\",\"NAME\",\"CREATED_AT\"\n"));
}

#[tokio::test]
async fn exact_multiple_produces_k_files_and_k_plus_one_selections() {
    let mut source = StubSource::with_rows(20);
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());

    let summary = run_backup(&mut source, &store, &params(10)).await.unwrap();

    assert_eq!(summary.batches, 2);
    assert_eq!(source.select_calls, 3); // final call returns zero rows
}

#[tokio::test]
async fn resumed_run_continues_the_sequence() {
    // A previous run committed batches 1..=3 for this month.
    let mut source = StubSource::with_rows(7);
    source.last_committed_seq = 3;
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());

    let summary = run_backup(&mut source, &store, &params(5)).await.unwrap();

    assert_eq!(
        summary.archives,
        vec![
            "db_backup/events/2022-03/backup_2022-03_batch4.csv.gz",
            "db_backup/events/2022-03/backup_2022-03_batch5.csv.gz",
        ]
    );
}

#[tokio::test]
async fn empty_window_archives_nothing() {
    let mut source = StubSource::with_rows(0);
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());

    let summary = run_backup(&mut source, &store, &params(10)).await.unwrap();

    assert_eq!(summary.batches, 0);
    assert_eq!(summary.rows, 0);
    assert_eq!(source.select_calls, 1);
}

#[tokio::test]
async fn backup_output_normalizes_losslessly() {
    let mut source = StubSource::with_rows(12);
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    run_backup(&mut source, &store, &params(12)).await.unwrap();

    let key = ArchiveKey::new(
        "events",
        MonthWindow::of(NaiveDate::from_ymd_opt(2022, 3, 1).unwrap()),
        1,
    );
    let archive = fetch_and_normalize(&store, &key).await.unwrap();

    assert_eq!(archive.columns, vec!["ID", "NAME", "CREATED_AT"]);
    assert_eq!(archive.records, 12);
    assert_eq!(archive.skipped, 0);

    // The canonical staging file matches what backup wrote, byte for byte.
    let stored = store.get(&key.object_path()).await.unwrap().bytes().await.unwrap();
    let mut original = String::new();
    GzDecoder::new(&stored[..])
        .read_to_string(&mut original)
        .unwrap();
    let canonical = std::fs::read_to_string(archive.file.path()).unwrap();
    assert_eq!(canonical, original);
}

#[tokio::test]
async fn normalize_drops_malformed_records_with_a_warning() {
    // Hand-build a damaged archive: one record is missing a field.
    let text = "\"ID\",\"NAME\",\"CREATED_AT\"\n\
                \"1\",\"ok\",\"2022-03-01T00:00:00.000Z\"\n\
                \"2\",\"short\"\n\
                \"3\",\"also ok\",\"2022-03-02T00:00:00.000Z\"\n";
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let key = ArchiveKey::new(
        "events",
        MonthWindow::of(NaiveDate::from_ymd_opt(2022, 3, 1).unwrap()),
        9,
    );
    store
        .put(&key.object_path(), PutPayload::from(compressed))
        .await
        .unwrap();

    let archive = fetch_and_normalize(&store, &key).await.unwrap();
    assert_eq!(archive.records, 2);
    assert_eq!(archive.skipped, 1);

    let canonical = std::fs::read_to_string(archive.file.path()).unwrap();
    assert!(canonical.contains("\"also ok\""));
    assert!(!canonical.contains("\"short\""));
}

#[tokio::test]
async fn missing_archive_is_an_error() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let key = ArchiveKey::new(
        "events",
        MonthWindow::of(NaiveDate::from_ymd_opt(2022, 3, 1).unwrap()),
        1,
    );
    assert!(fetch_and_normalize(&store, &key).await.is_err());
}
