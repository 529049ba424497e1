//! Validation outcomes and the monthly-ledger row model.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, hash::ContentHash, record::NormalizedRecord};

/// Fixed column order of every monthly ledger.
pub const LEDGER_HEADER: [&str; 16] = [
  "date",
  "vendor",
  "item",
  "qty",
  "unit_price",
  "line_total",
  "subtotal",
  "tax",
  "total",
  "currency",
  "payment_method",
  "receipt_id",
  "image_hash",
  "status",
  "notes",
  "file_link",
];

/// Label of the synthetic aggregate row rendered at the foot of a ledger.
pub const AGGREGATE_LABEL: &str = "MONTH TOTAL";

// ─── Month key ───────────────────────────────────────────────────────────────

/// `YYYY-MM` ledger key, derived from the purchase date in the target
/// timezone (or from the current date when the purchase date is unknown).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonthKey(String);

impl MonthKey {
  pub fn from_date(date: NaiveDate) -> Self {
    Self(date.format("%Y-%m").to_string())
  }

  /// The month containing `now` in the given UTC offset.
  pub fn current(now: DateTime<Utc>, offset: FixedOffset) -> Self {
    Self::from_date(now.with_timezone(&offset).date_naive())
  }

  /// Parse an externally supplied `YYYY-MM` string.
  pub fn parse(s: &str) -> Result<Self> {
    let ok = s.len() == 7
      && s.as_bytes()[4] == b'-'
      && s[..4].chars().all(|c| c.is_ascii_digit())
      && s[5..].chars().all(|c| c.is_ascii_digit());
    if !ok {
      return Err(Error::BadMonthKey(s.to_string()));
    }
    Ok(Self(s.to_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for MonthKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Row status ──────────────────────────────────────────────────────────────

/// Whether a row is settled or parked for a human to look at. Review rows
/// are written to the ledger like any other but are excluded from the
/// aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowStatus {
  #[serde(rename = "OK")]
  Ok,
  #[serde(rename = "NEEDS_REVIEW")]
  NeedsReview,
}

impl RowStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Ok => "OK",
      Self::NeedsReview => "NEEDS_REVIEW",
    }
  }
}

// ─── Ledger row ──────────────────────────────────────────────────────────────

/// One ledger row — one line item of a receipt, with the shared header
/// fields repeated. All rows of a receipt carry the same content hash so
/// the writer can treat them as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRow {
  pub date:           Option<NaiveDate>,
  pub vendor:         Option<String>,
  pub item:           Option<String>,
  pub qty:            Option<f64>,
  pub unit_price:     Option<f64>,
  pub line_total:     Option<f64>,
  pub subtotal:       Option<f64>,
  pub tax:            Option<f64>,
  pub total:          Option<f64>,
  pub currency:       String,
  pub payment_method: Option<String>,
  pub receipt_id:     Option<String>,
  pub image_hash:     Option<ContentHash>,
  pub status:         RowStatus,
  pub notes:          String,
  pub file_link:      String,
}

impl LedgerRow {
  /// Render the row as the 16 header-ordered cells.
  pub fn render(&self) -> Vec<String> {
    fn opt_s(value: &Option<String>) -> String {
      value.clone().unwrap_or_default()
    }
    fn opt_n(value: Option<f64>) -> String {
      value.map(|v| format!("{v:.2}")).unwrap_or_default()
    }

    vec![
      self.date.map(|d| d.to_string()).unwrap_or_default(),
      opt_s(&self.vendor),
      opt_s(&self.item),
      opt_n(self.qty),
      opt_n(self.unit_price),
      opt_n(self.line_total),
      opt_n(self.subtotal),
      opt_n(self.tax),
      opt_n(self.total),
      self.currency.clone(),
      opt_s(&self.payment_method),
      opt_s(&self.receipt_id),
      self.image_hash.as_ref().map(|h| h.to_string()).unwrap_or_default(),
      self.status.as_str().to_string(),
      self.notes.clone(),
      self.file_link.clone(),
    ]
  }
}

/// Render a whole ledger: header, data rows, and the aggregate positioned
/// as the final `MONTH TOTAL` row.
pub fn render_sheet(rows: &[LedgerRow], aggregate: f64) -> Vec<Vec<String>> {
  let mut sheet = Vec::with_capacity(rows.len() + 2);
  sheet.push(LEDGER_HEADER.iter().map(|h| h.to_string()).collect());
  sheet.extend(rows.iter().map(LedgerRow::render));

  let mut footer = vec![String::new(); LEDGER_HEADER.len()];
  footer[0] = AGGREGATE_LABEL.to_string();
  footer[8] = format!("{aggregate:.2}");
  sheet.push(footer);
  sheet
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Emitted by the validator for every non-duplicate input: the normalized
/// record, its rendered rows, and the notes explaining anything off. A
/// value, produced once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
  #[serde(rename = "fileId")]
  pub file_id:   String,
  pub month_key: MonthKey,
  pub norm:      NormalizedRecord,
  pub rows:      Vec<LedgerRow>,
  pub notes:     Vec<String>,
  pub status:    RowStatus,
}

impl ValidationOutcome {
  /// The content hash shared by this outcome's rows, if any.
  pub fn content_hash(&self) -> Option<&ContentHash> {
    self.rows.iter().find_map(|r| r.image_hash.as_ref())
  }
}

/// Terminal outcome for a receipt that was already committed: no rows, no
/// ledger write, just the key that matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateOutcome {
  #[serde(rename = "fileId")]
  pub file_id:    String,
  pub dedupe_key: String,
  pub norm:       NormalizedRecord,
}
