//! The dedupe key — what the validator uses to decide duplicate-vs-novel.

use serde::{Deserialize, Serialize};

use crate::{hash::ContentHash, record::NormalizedRecord};

/// Key for the validator's duplicate decision. Stable across repeated runs
/// on the same input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DedupeKey {
  /// The content hash — trustworthy; a marker hit on this key is a terminal
  /// duplicate.
  Content(ContentHash),
  /// Fallback when no content hash is available: normalized vendor +
  /// purchase date + total rounded to currency precision. Two distinct
  /// receipts can collide here, so a marker hit only flags for review.
  Composite(String),
}

impl DedupeKey {
  /// Derive the key for a normalized record. `None` when neither a content
  /// hash nor the full vendor/date/total triple is available — such records
  /// cannot be deduplicated and are review material anyway.
  pub fn derive(record: &NormalizedRecord) -> Option<Self> {
    if let Some(hash) = &record.image_hash {
      return Some(Self::Content(hash.clone()));
    }
    match (&record.vendor, record.purchase_date, record.total) {
      (Some(vendor), Some(date), Some(total)) => Some(Self::Composite(format!(
        "{}|{}|{:.2}",
        vendor.trim().to_lowercase(),
        date,
        total
      ))),
      _ => None,
    }
  }

  /// The string written to the marker store.
  pub fn storage_key(&self) -> &str {
    match self {
      Self::Content(hash) => hash.as_str(),
      Self::Composite(key) => key,
    }
  }

  /// Whether a marker hit on this key is conclusive (content hash) or only
  /// suggestive (composite fallback).
  pub fn is_conclusive(&self) -> bool {
    matches!(self, Self::Content(_))
  }
}
