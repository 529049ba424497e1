//! Receipt records — untrusted as returned by the structuring stage, and
//! fully normalized as produced by the validator.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

// ─── Raw (untrusted) ─────────────────────────────────────────────────────────

/// One line item as returned by the structuring stage. Numerics may arrive
/// as JSON numbers or locale-formatted strings ("RM 12.50", "1,299.00").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawItem {
  pub description: Option<String>,
  pub quantity:    Option<serde_json::Value>,
  pub unit_price:  Option<serde_json::Value>,
  pub line_total:  Option<serde_json::Value>,
}

/// Record as returned by the structuring stage.
///
/// Every field is optional and nothing here is believed until the validator
/// has normalized it — the stage is a black box and its output may be
/// internally inconsistent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
  pub vendor:            Option<String>,
  pub purchase_date:     Option<String>,
  pub currency:          Option<String>,
  pub subtotal:          Option<serde_json::Value>,
  pub tax:               Option<serde_json::Value>,
  pub total:             Option<serde_json::Value>,
  pub payment_method:    Option<String>,
  pub items:             Vec<RawItem>,
  pub receipt_id:        Option<String>,
  /// Echo of the content hash, if the stage preserved it. The validator
  /// prefers the hash carried on the event itself.
  pub source_image_hash: Option<String>,
}

// ─── Normalized ──────────────────────────────────────────────────────────────

/// A line item after coercion and derivation of missing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedItem {
  pub description: Option<String>,
  pub quantity:    f64,
  pub unit_price:  Option<f64>,
  pub line_total:  Option<f64>,
}

/// Fully-normalized receipt record produced by the validator. All amounts
/// are rounded to two decimal places; the date is a calendar date in the
/// target timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecord {
  pub vendor:         Option<String>,
  pub purchase_date:  Option<NaiveDate>,
  pub currency:       String,
  pub subtotal:       Option<f64>,
  pub tax:            Option<f64>,
  pub total:          Option<f64>,
  pub payment_method: Option<String>,
  pub items:          Vec<NormalizedItem>,
  pub receipt_id:     Option<String>,
  pub image_hash:     Option<ContentHash>,
}

impl NormalizedRecord {
  /// Placeholder record for inputs the structuring stage could not parse.
  /// Carries the content hash so the ledger row stays identifiable.
  pub fn placeholder(image_hash: Option<ContentHash>, default_currency: &str) -> Self {
    Self {
      vendor:         None,
      purchase_date:  None,
      currency:       default_currency.to_string(),
      subtotal:       None,
      tax:            None,
      total:          None,
      payment_method: None,
      items:          Vec::new(),
      receipt_id:     None,
      image_hash,
    }
  }

  /// Sum of line totals over items that have one, rounded to 2 dp.
  pub fn sum_of_lines(&self) -> f64 {
    let sum: f64 = self.items.iter().filter_map(|it| it.line_total).sum();
    (sum * 100.0).round() / 100.0
  }
}
