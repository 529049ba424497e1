//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::NaiveDate;
use tally_core::{
  dedupe::DedupeKey,
  hash::ContentHash,
  outcome::{LedgerRow, MonthKey, RowStatus},
  store::{LedgerStore, Mark, MarkerStore},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn month() -> MonthKey {
  MonthKey::parse("2025-09").unwrap()
}

fn receipt_rows(hash: &ContentHash, total: f64, status: RowStatus, items: &[&str]) -> Vec<LedgerRow> {
  items
    .iter()
    .map(|item| LedgerRow {
      date:           NaiveDate::from_ymd_opt(2025, 9, 21),
      vendor:         Some("Cafe Uno".into()),
      item:           Some(item.to_string()),
      qty:            Some(1.0),
      unit_price:     Some(total),
      line_total:     Some(total / items.len() as f64),
      subtotal:       Some(total),
      tax:            None,
      total:          Some(total),
      currency:       "MYR".into(),
      payment_method: None,
      receipt_id:     None,
      image_hash:     Some(hash.clone()),
      status,
      notes:          String::new(),
      file_link:      String::new(),
    })
    .collect()
}

// ─── Markers ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_marker_write_wins() {
  let s = store().await;
  let key = DedupeKey::Content(ContentHash::digest(b"receipt"));

  assert_eq!(s.mark(&key, "file-a").await.unwrap(), Mark::Created);
  // Repeats always report the original owner, whoever asks.
  assert_eq!(
    s.mark(&key, "file-a").await.unwrap(),
    Mark::Existing { owner: "file-a".to_string() }
  );
  assert_eq!(
    s.mark(&key, "file-b").await.unwrap(),
    Mark::Existing { owner: "file-a".to_string() }
  );
}

#[tokio::test]
async fn distinct_keys_do_not_interfere() {
  let s = store().await;
  let a = DedupeKey::Content(ContentHash::digest(b"a"));
  let b = DedupeKey::Composite("cafe|2025-09-21|10.00".into());

  assert_eq!(s.mark(&a, "f1").await.unwrap(), Mark::Created);
  assert_eq!(s.mark(&b, "f2").await.unwrap(), Mark::Created);
  assert_eq!(
    s.mark(&a, "f3").await.unwrap(),
    Mark::Existing { owner: "f1".to_string() }
  );
}

// ─── Ledger rows ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_and_read_back() {
  let s = store().await;
  let hash = ContentHash::digest(b"receipt");
  let rows = receipt_rows(&hash, 23.0, RowStatus::Ok, &["espresso", "latte"]);

  s.append_rows(&month(), &rows).await.unwrap();

  let read = s.rows(&month()).await.unwrap();
  assert_eq!(read.len(), 2);
  assert_eq!(read[0].item.as_deref(), Some("espresso"));
  assert_eq!(read[1].item.as_deref(), Some("latte"));
  assert_eq!(read[0].image_hash, Some(hash.clone()));
  assert_eq!(read[0].date, NaiveDate::from_ymd_opt(2025, 9, 21));
}

#[tokio::test]
async fn contains_sees_only_the_right_month() {
  let s = store().await;
  let hash = ContentHash::digest(b"receipt");
  s.append_rows(&month(), &receipt_rows(&hash, 10.0, RowStatus::Ok, &["x"]))
    .await
    .unwrap();

  assert!(s.contains(&month(), &hash).await.unwrap());
  let other = MonthKey::parse("2025-10").unwrap();
  assert!(!s.contains(&other, &hash).await.unwrap());
  assert!(!s.contains(&month(), &ContentHash::digest(b"other")).await.unwrap());
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn aggregate_counts_each_receipt_once() {
  let s = store().await;
  let h1 = ContentHash::digest(b"one");
  let h2 = ContentHash::digest(b"two");

  // h1 is a three-line receipt with total 30; h2 a single line with 12.
  s.append_rows(&month(), &receipt_rows(&h1, 30.0, RowStatus::Ok, &["a", "b", "c"]))
    .await
    .unwrap();
  s.append_rows(&month(), &receipt_rows(&h2, 12.0, RowStatus::Ok, &["d"]))
    .await
    .unwrap();

  let total = s.recompute_aggregate(&month()).await.unwrap();
  assert_eq!(total, 42.0);
  assert_eq!(s.aggregate(&month()).await.unwrap(), Some(42.0));
}

#[tokio::test]
async fn aggregate_excludes_review_rows() {
  let s = store().await;
  let ok = ContentHash::digest(b"ok");
  let review = ContentHash::digest(b"review");

  s.append_rows(&month(), &receipt_rows(&ok, 23.0, RowStatus::Ok, &["a"]))
    .await
    .unwrap();
  s.append_rows(&month(), &receipt_rows(&review, 99.0, RowStatus::NeedsReview, &["b"]))
    .await
    .unwrap();

  assert_eq!(s.recompute_aggregate(&month()).await.unwrap(), 23.0);
}

#[tokio::test]
async fn aggregate_is_overwritten_not_incremented() {
  let s = store().await;
  let hash = ContentHash::digest(b"receipt");
  s.append_rows(&month(), &receipt_rows(&hash, 23.0, RowStatus::Ok, &["a"]))
    .await
    .unwrap();

  // Recomputing repeatedly must be a fixed point, not a running sum.
  assert_eq!(s.recompute_aggregate(&month()).await.unwrap(), 23.0);
  assert_eq!(s.recompute_aggregate(&month()).await.unwrap(), 23.0);
  assert_eq!(s.aggregate(&month()).await.unwrap(), Some(23.0));
}

#[tokio::test]
async fn aggregate_of_empty_month_is_zero() {
  let s = store().await;
  assert_eq!(s.aggregate(&month()).await.unwrap(), None);
  assert_eq!(s.recompute_aggregate(&month()).await.unwrap(), 0.0);
  assert_eq!(s.aggregate(&month()).await.unwrap(), Some(0.0));
}
