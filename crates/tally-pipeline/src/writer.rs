//! Ledger Writer — idempotent append plus aggregate maintenance.
//!
//! Append and recompute are serialized per month: without that, two
//! concurrent appends could each recompute a stale aggregate. The critical
//! section is as short as the contract allows — check, append, recompute —
//! and is the only place in the pipeline where a lock is held across I/O.

use std::{collections::HashMap, sync::Arc};

use tally_core::{
  outcome::{MonthKey, ValidationOutcome},
  store::LedgerStore,
};
use tokio::sync::Mutex;

use crate::{Error, Result};

/// What one delivery did to the ledger.
#[derive(Debug, PartialEq)]
pub struct WriteReport {
  /// Rows appended; zero when the content hash was already present.
  pub appended:  usize,
  pub aggregate: f64,
}

pub struct LedgerWriter<L> {
  store: L,
  locks: Mutex<HashMap<MonthKey, Arc<Mutex<()>>>>,
}

impl<L: LedgerStore> LedgerWriter<L> {
  pub fn new(store: L) -> Self {
    Self { store, locks: Mutex::new(HashMap::new()) }
  }

  async fn month_lock(&self, month: &MonthKey) -> Arc<Mutex<()>> {
    let mut locks = self.locks.lock().await;
    locks.entry(month.clone()).or_default().clone()
  }

  /// Apply one validation outcome. Redelivery of an outcome whose content
  /// hash is already in the month's ledger is a no-op — the row count and
  /// the aggregate stay exactly as they were.
  pub async fn apply(&self, outcome: &ValidationOutcome) -> Result<WriteReport> {
    let month = &outcome.month_key;
    let lock = self.month_lock(month).await;
    let _guard = lock.lock().await;

    if let Some(hash) = outcome.content_hash()
      && self.store.contains(month, hash).await.map_err(Error::ledger)?
    {
      tracing::info!(file_id = %outcome.file_id, month = %month, %hash, "already recorded; skipping append");
      let aggregate = self
        .store
        .aggregate(month)
        .await
        .map_err(Error::ledger)?
        .unwrap_or(0.0);
      return Ok(WriteReport { appended: 0, aggregate });
    }

    self
      .store
      .append_rows(month, &outcome.rows)
      .await
      .map_err(Error::ledger)?;
    let aggregate = self
      .store
      .recompute_aggregate(month)
      .await
      .map_err(Error::ledger)?;

    tracing::info!(
      file_id = %outcome.file_id,
      month = %month,
      rows = outcome.rows.len(),
      status = outcome.status.as_str(),
      aggregate,
      "appended"
    );
    Ok(WriteReport { appended: outcome.rows.len(), aggregate })
  }

  pub fn store(&self) -> &L {
    &self.store
  }
}
