//! [`SqliteStore`] — the SQLite implementation of [`MarkerStore`] and
//! [`LedgerStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tally_core::{
  dedupe::DedupeKey,
  hash::ContentHash,
  outcome::{LedgerRow, MonthKey},
  store::{LedgerStore, Mark, MarkerStore},
};

use crate::{
  Error, Result,
  encode::{RawLedgerRow, encode_date, encode_dt, encode_status},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Markers and ledgers backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── MarkerStore impl ────────────────────────────────────────────────────────

impl MarkerStore for SqliteStore {
  type Error = Error;

  async fn mark(&self, key: &DedupeKey, owner: &str) -> Result<Mark> {
    let key_str   = key.storage_key().to_owned();
    let owner_str = owner.to_owned();
    let at_str    = encode_dt(Utc::now());

    let mark: Mark = self
      .conn
      .call(move |conn| {
        // INSERT OR IGNORE against the PRIMARY KEY: of two racing writers,
        // exactly one reports a changed row. The whole closure runs on the
        // single connection, so the follow-up read cannot interleave with
        // another writer.
        let changed = conn.execute(
          "INSERT OR IGNORE INTO dedupe_markers (key, owner, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![key_str, owner_str, at_str],
        )?;
        if changed == 1 {
          return Ok(Mark::Created);
        }
        let owner: String = conn.query_row(
          "SELECT owner FROM dedupe_markers WHERE key = ?1",
          rusqlite::params![key_str],
          |row| row.get(0),
        )?;
        Ok(Mark::Existing { owner })
      })
      .await?;

    Ok(mark)
  }
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
  type Error = Error;

  async fn contains(&self, month: &MonthKey, hash: &ContentHash) -> Result<bool> {
    let month_str = month.as_str().to_owned();
    let hash_str  = hash.as_str().to_owned();

    let found: bool = self
      .conn
      .call(move |conn| {
        let found = conn
          .query_row(
            "SELECT 1 FROM ledger_rows WHERE month_key = ?1 AND image_hash = ?2 LIMIT 1",
            rusqlite::params![month_str, hash_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        Ok(found)
      })
      .await?;

    Ok(found)
  }

  async fn append_rows(&self, month: &MonthKey, rows: &[LedgerRow]) -> Result<()> {
    let month_str = month.as_str().to_owned();
    let encoded: Vec<_> = rows
      .iter()
      .map(|row| {
        (
          encode_date(row.date),
          row.vendor.clone(),
          row.item.clone(),
          row.qty,
          row.unit_price,
          row.line_total,
          row.subtotal,
          row.tax,
          row.total,
          row.currency.clone(),
          row.payment_method.clone(),
          row.receipt_id.clone(),
          row.image_hash.as_ref().map(|h| h.as_str().to_owned()),
          encode_status(row.status),
          row.notes.clone(),
          row.file_link.clone(),
        )
      })
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for row in &encoded {
          tx.execute(
            "INSERT INTO ledger_rows (
               month_key, date, vendor, item, qty, unit_price, line_total,
               subtotal, tax, total, currency, payment_method, receipt_id,
               image_hash, status, notes, file_link
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            rusqlite::params![
              month_str, row.0, row.1, row.2, row.3, row.4, row.5, row.6,
              row.7, row.8, row.9, row.10, row.11, row.12, row.13, row.14,
              row.15,
            ],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn recompute_aggregate(&self, month: &MonthKey) -> Result<f64> {
    let month_str = month.as_str().to_owned();
    let at_str    = encode_dt(Utc::now());

    let total: f64 = self
      .conn
      .call(move |conn| {
        // Distinct content hashes only — all rows of a multi-line receipt
        // share the receipt total, so MAX per hash counts it once.
        let total: f64 = conn.query_row(
          "SELECT COALESCE(SUM(t), 0.0) FROM (
             SELECT MAX(total) AS t FROM ledger_rows
             WHERE month_key = ?1
               AND status = 'OK'
               AND image_hash IS NOT NULL
               AND total IS NOT NULL
             GROUP BY image_hash
           )",
          rusqlite::params![month_str],
          |row| row.get(0),
        )?;

        conn.execute(
          "INSERT INTO ledger_totals (month_key, total, updated_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(month_key)
           DO UPDATE SET total = excluded.total, updated_at = excluded.updated_at",
          rusqlite::params![month_str, total, at_str],
        )?;

        Ok(total)
      })
      .await?;

    Ok(total)
  }

  async fn aggregate(&self, month: &MonthKey) -> Result<Option<f64>> {
    let month_str = month.as_str().to_owned();

    let total: Option<f64> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT total FROM ledger_totals WHERE month_key = ?1",
              rusqlite::params![month_str],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(total)
  }

  async fn rows(&self, month: &MonthKey) -> Result<Vec<LedgerRow>> {
    let month_str = month.as_str().to_owned();

    let raws: Vec<RawLedgerRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT date, vendor, item, qty, unit_price, line_total,
                  subtotal, tax, total, currency, payment_method, receipt_id,
                  image_hash, status, notes, file_link
           FROM ledger_rows
           WHERE month_key = ?1
           ORDER BY seq",
        )?;

        let rows = stmt
          .query_map(rusqlite::params![month_str], |row| {
            Ok(RawLedgerRow {
              date:           row.get(0)?,
              vendor:         row.get(1)?,
              item:           row.get(2)?,
              qty:            row.get(3)?,
              unit_price:     row.get(4)?,
              line_total:     row.get(5)?,
              subtotal:       row.get(6)?,
              tax:            row.get(7)?,
              total:          row.get(8)?,
              currency:       row.get(9)?,
              payment_method: row.get(10)?,
              receipt_id:     row.get(11)?,
              image_hash:     row.get(12)?,
              status:         row.get(13)?,
              notes:          row.get(14)?,
              file_link:      row.get(15)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLedgerRow::into_row).collect()
  }
}
