//! End-to-end pipeline tests: candidate event in, ledger rows out, over the
//! in-process bus with an in-memory SQLite store behind the validator and
//! the writer.

use std::{
  path::PathBuf,
  time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::Utc;
use serde_json::json;
use tally_core::{
  bus::{EventBus as _, Topics},
  event::CandidateEvent,
  hash::ContentHash,
  outcome::{DuplicateOutcome, LedgerRow, MonthKey, RowStatus},
  record::{RawItem, RawRecord},
  retry::RetryPolicy,
  store::LedgerStore as _,
};
use tally_pipeline::{
  bus::MemoryBus,
  extract::{ContentExtractor, DisabledOcr, ExtractorConfig, Utf8TextLayer},
  fs::LocalDirSource,
  run::spawn_stages,
  structuring::{FixedStructurer, StructuringStage},
  validate::{Validator, ValidatorConfig},
  writer::LedgerWriter,
};
use tally_store_sqlite::SqliteStore;

fn scratch_root(tag: &str) -> PathBuf {
  let unique = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
  let root = std::env::temp_dir().join(format!("tally-e2e-{tag}-{unique}"));
  std::fs::create_dir_all(root.join("inbox")).unwrap();
  root
}

fn clean_record() -> RawRecord {
  RawRecord {
    vendor:        Some("Cafe Uno".into()),
    purchase_date: Some("2025-09-21".into()),
    currency:      Some("MYR".into()),
    subtotal:      Some(json!(23.0)),
    tax:           Some(json!(0.0)),
    total:         Some(json!(23.0)),
    items:         vec![RawItem {
      description: Some("espresso".into()),
      quantity:    Some(json!(1)),
      unit_price:  Some(json!(23.0)),
      line_total:  Some(json!(23.0)),
    }],
    ..RawRecord::default()
  }
}

struct Harness {
  bus:   MemoryBus,
  store: SqliteStore,
  root:  PathBuf,
}

async fn start(tag: &str, record: Option<RawRecord>) -> Harness {
  let root = scratch_root(tag);
  let bus = MemoryBus::new();
  let store = SqliteStore::open_in_memory().await.unwrap();
  let topics = Topics::default();
  let policy = RetryPolicy { max_attempts: 2, base_delay_ms: 1, multiplier: 1.0 };

  let extractor = ContentExtractor::new(
    LocalDirSource::new(&root),
    Utf8TextLayer,
    DisabledOcr,
    bus.clone(),
    topics.clone(),
    ExtractorConfig::default(),
  );
  let structuring = StructuringStage::new(FixedStructurer(record), bus.clone(), topics.clone());
  let validator = Validator::new(
    store.clone(),
    bus.clone(),
    topics.clone(),
    ValidatorConfig::default(),
  );
  let writer = LedgerWriter::new(store.clone());

  spawn_stages(&bus, &topics, policy, extractor, structuring, validator, writer);
  Harness { bus, store, root }
}

fn candidate(file_id: &str) -> CandidateEvent {
  CandidateEvent {
    file_id:         file_id.to_string(),
    name:            file_id.rsplit('/').next().unwrap().to_string(),
    mime_type:       "text/plain".to_string(),
    created_time:    Utc::now(),
    folder_id:       "inbox".to_string(),
    idempotency_key: format!("key-{file_id}"),
  }
}

async fn publish_candidate(harness: &Harness, file_id: &str) {
  let payload = serde_json::to_vec(&candidate(file_id)).unwrap();
  harness
    .bus
    .publish(&Topics::default().candidates, &payload)
    .await
    .unwrap();
}

async fn wait_for_rows(store: &SqliteStore, month: &MonthKey, n: usize) -> Vec<LedgerRow> {
  for _ in 0..500 {
    let rows = store.rows(month).await.unwrap();
    if rows.len() >= n {
      return rows;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  panic!("timed out waiting for {n} ledger rows");
}

#[tokio::test]
async fn candidate_flows_through_to_the_ledger() {
  let harness = start("happy", Some(clean_record())).await;
  std::fs::write(harness.root.join("inbox/r1.txt"), b"CAFE UNO\nTOTAL 23.00").unwrap();

  publish_candidate(&harness, "inbox/r1.txt").await;

  let month = MonthKey::parse("2025-09").unwrap();
  let rows = wait_for_rows(&harness.store, &month, 1).await;
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].status, RowStatus::Ok);
  assert_eq!(rows[0].vendor.as_deref(), Some("Cafe Uno"));
  assert_eq!(
    rows[0].image_hash,
    Some(ContentHash::digest(b"CAFE UNO\nTOTAL 23.00"))
  );
  assert_eq!(harness.store.aggregate(&month).await.unwrap(), Some(23.0));
}

#[tokio::test]
async fn redelivered_candidate_produces_exactly_one_row() {
  let harness = start("redelivery", Some(clean_record())).await;
  std::fs::write(harness.root.join("inbox/r1.txt"), b"CAFE UNO\nTOTAL 23.00").unwrap();
  std::fs::write(harness.root.join("inbox/r2.txt"), b"OTHER SHOP\nTOTAL 23.00").unwrap();

  publish_candidate(&harness, "inbox/r1.txt").await;
  let month = MonthKey::parse("2025-09").unwrap();
  wait_for_rows(&harness.store, &month, 1).await;

  // At-least-once delivery: the same candidate arrives twice more, then a
  // different receipt. Topics are FIFO through each single-consumer stage,
  // so once r2's row is visible both redeliveries have fully drained.
  publish_candidate(&harness, "inbox/r1.txt").await;
  publish_candidate(&harness, "inbox/r1.txt").await;
  publish_candidate(&harness, "inbox/r2.txt").await;
  let rows = wait_for_rows(&harness.store, &month, 2).await;

  assert_eq!(rows.len(), 2);
  let r1_hash = Some(ContentHash::digest(b"CAFE UNO\nTOTAL 23.00"));
  assert_eq!(rows.iter().filter(|r| r.image_hash == r1_hash).count(), 1);
  // Two distinct receipts, 23.00 each; redeliveries added nothing.
  assert_eq!(harness.store.aggregate(&month).await.unwrap(), Some(46.0));
}

#[tokio::test]
async fn rescan_of_identical_bytes_is_a_duplicate() {
  let harness = start("rescan", Some(clean_record())).await;
  // Two distinct files with byte-identical content: same content identity.
  std::fs::write(harness.root.join("inbox/a.txt"), b"CAFE UNO\nTOTAL 23.00").unwrap();
  std::fs::write(harness.root.join("inbox/b.txt"), b"CAFE UNO\nTOTAL 23.00").unwrap();

  let mut dup_rx = harness.bus.subscribe(&Topics::default().duplicate);

  publish_candidate(&harness, "inbox/a.txt").await;
  let month = MonthKey::parse("2025-09").unwrap();
  wait_for_rows(&harness.store, &month, 1).await;

  publish_candidate(&harness, "inbox/b.txt").await;
  let dup: DuplicateOutcome = serde_json::from_slice(&dup_rx.recv().await.unwrap()).unwrap();
  assert_eq!(dup.file_id, "inbox/b.txt");

  assert_eq!(harness.store.rows(&month).await.unwrap().len(), 1);
  assert_eq!(harness.store.aggregate(&month).await.unwrap(), Some(23.0));
}

#[tokio::test]
async fn failed_structuring_parks_the_receipt_in_review() {
  // FixedStructurer(None) behaves like a structuring stage that cannot
  // produce a record at all.
  let harness = start("review", None).await;
  std::fs::write(harness.root.join("inbox/r1.txt"), b"illegible scan").unwrap();

  publish_candidate(&harness, "inbox/r1.txt").await;

  // Month key falls back to the current month in the target offset.
  let offset = chrono::FixedOffset::east_opt(8 * 3600).unwrap();
  let month = MonthKey::current(Utc::now(), offset);
  let rows = wait_for_rows(&harness.store, &month, 1).await;

  assert_eq!(rows[0].status, RowStatus::NeedsReview);
  assert!(rows[0].notes.contains("structuring failed"));
  assert_eq!(rows[0].image_hash, Some(ContentHash::digest(b"illegible scan")));
  // Review rows never count toward the aggregate.
  assert_eq!(harness.store.aggregate(&month).await.unwrap(), Some(0.0));
}
