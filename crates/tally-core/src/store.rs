//! Storage traits for the two pieces of state shared across concurrent
//! stage instances: the dedupe marker store and the monthly ledger.
//!
//! Backends (e.g. `tally-store-sqlite`) implement these; the validator and
//! the ledger writer depend on the abstractions, not on any concrete
//! backend.

use std::future::Future;

use crate::{
  dedupe::DedupeKey,
  hash::ContentHash,
  outcome::{LedgerRow, MonthKey},
};

// ─── Marker store ────────────────────────────────────────────────────────────

/// Result of a first-writer-wins marker attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mark {
  /// This call created the marker.
  Created,
  /// The marker already existed; `owner` is the file id that created it.
  /// The caller distinguishes redelivery of its own event (same owner)
  /// from a genuine duplicate (different owner).
  Existing { owner: String },
}

/// Durable first-writer-wins markers keyed by dedupe key.
///
/// `mark` must be atomic per key: of two concurrent calls with the same
/// key, exactly one observes `Created`. This is the validator's dedupe
/// boundary; the writer's content-hash check is the second line of
/// defense.
pub trait MarkerStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create the marker for `key` if absent, recording `owner` (the file id
  /// of the event making the claim).
  fn mark<'a>(
    &'a self,
    key: &'a DedupeKey,
    owner: &'a str,
  ) -> impl Future<Output = Result<Mark, Self::Error>> + Send + 'a;
}

// ─── Ledger store ────────────────────────────────────────────────────────────

/// Storage backend for monthly ledgers.
///
/// The backend provides the primitives; the ledger writer serializes
/// check/append/recompute per month around them. The aggregate is always
/// recomputed from the rows, never incremented.
pub trait LedgerStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Whether any row in `month` already bears this content hash.
  fn contains<'a>(
    &'a self,
    month: &'a MonthKey,
    hash: &'a ContentHash,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Append rows (one receipt's worth) to `month`, creating the ledger if
  /// absent. All-or-nothing.
  fn append_rows<'a>(
    &'a self,
    month: &'a MonthKey,
    rows: &'a [LedgerRow],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Recompute the aggregate for `month` from its rows — the sum of `total`
  /// over distinct content hashes with status OK — overwrite the stored
  /// value, and return it.
  fn recompute_aggregate<'a>(
    &'a self,
    month: &'a MonthKey,
  ) -> impl Future<Output = Result<f64, Self::Error>> + Send + 'a;

  /// The stored aggregate for `month`, if one has been computed.
  fn aggregate<'a>(
    &'a self,
    month: &'a MonthKey,
  ) -> impl Future<Output = Result<Option<f64>, Self::Error>> + Send + 'a;

  /// All rows of `month` in append order.
  fn rows<'a>(
    &'a self,
    month: &'a MonthKey,
  ) -> impl Future<Output = Result<Vec<LedgerRow>, Self::Error>> + Send + 'a;
}
