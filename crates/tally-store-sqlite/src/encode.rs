//! Conversions between domain types and their SQLite column encodings.

use chrono::{DateTime, NaiveDate, Utc};
use tally_core::{
  hash::ContentHash,
  outcome::{LedgerRow, RowStatus},
};

use crate::{Error, Result};

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339()
}

pub fn encode_date(date: Option<NaiveDate>) -> Option<String> {
  date.map(|d| d.to_string())
}

pub fn decode_date(s: Option<String>) -> Result<Option<NaiveDate>> {
  s.map(|s| s.parse::<NaiveDate>().map_err(|_| Error::DateParse(s)))
    .transpose()
}

pub fn encode_status(status: RowStatus) -> &'static str {
  status.as_str()
}

pub fn decode_status(s: &str) -> Result<RowStatus> {
  match s {
    "OK" => Ok(RowStatus::Ok),
    "NEEDS_REVIEW" => Ok(RowStatus::NeedsReview),
    other => Err(Error::BadStatus(other.to_string())),
  }
}

/// A ledger row as read straight out of SQLite, before decoding.
pub struct RawLedgerRow {
  pub date:           Option<String>,
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
  pub image_hash:     Option<String>,
  pub status:         String,
  pub notes:          String,
  pub file_link:      String,
}

impl RawLedgerRow {
  pub fn into_row(self) -> Result<LedgerRow> {
    Ok(LedgerRow {
      date:           decode_date(self.date)?,
      vendor:         self.vendor,
      item:           self.item,
      qty:            self.qty,
      unit_price:     self.unit_price,
      line_total:     self.line_total,
      subtotal:       self.subtotal,
      tax:            self.tax,
      total:          self.total,
      currency:       self.currency,
      payment_method: self.payment_method,
      receipt_id:     self.receipt_id,
      image_hash:     self.image_hash.map(ContentHash::from_wire),
      status:         decode_status(&self.status)?,
      notes:          self.notes,
      file_link:      self.file_link,
    })
  }
}
