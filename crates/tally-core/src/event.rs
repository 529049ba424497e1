//! Wire events exchanged between pipeline stages.
//!
//! Every hand-off is at-least-once; events are immutable values and each
//! carries enough identity (idempotency key, then content hash) for the
//! receiving stage to make its effect idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{hash::ContentHash, record::RawRecord};

// ─── Candidate ───────────────────────────────────────────────────────────────

/// Event admitted by the intake gate: one candidate receipt, one event.
///
/// Identity is the idempotency key, derived deterministically from the
/// source descriptor so re-delivery of the same file produces the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEvent {
  pub file_id:         String,
  pub name:            String,
  pub mime_type:       String,
  pub created_time:    DateTime<Utc>,
  pub folder_id:       String,
  pub idempotency_key: String,
}

// ─── Text ────────────────────────────────────────────────────────────────────

/// Which engine produced the text and how trustworthy it is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrMeta {
  pub engine:     String,
  pub confidence: f64,
  pub pages:      u32,
}

/// Emitted by the content extractor. The `image_hash` computed here is the
/// durable identity of the receipt for the rest of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEvent {
  #[serde(rename = "fileId")]
  pub file_id:      String,
  pub name:         String,
  #[serde(rename = "createdTime")]
  pub created_time: DateTime<Utc>,
  pub image_hash:   ContentHash,
  pub text:         String,
  pub ocr_meta:     OcrMeta,
}

// ─── Structured ──────────────────────────────────────────────────────────────

/// Output of the opaque structuring stage. `data` is `None` when the stage
/// could not produce a record; the validator routes that to review, never
/// drops it. `llm_meta` is free-form and purely diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredEvent {
  #[serde(rename = "fileId")]
  pub file_id:    String,
  /// Propagated from the text event. Optional only defensively — the
  /// structuring hop is a black box; the validator falls back to the
  /// composite dedupe key when it is missing.
  pub image_hash: Option<ContentHash>,
  pub data:       Option<RawRecord>,
  pub llm_meta:   serde_json::Value,
}
