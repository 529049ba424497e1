//! The event bus seam between stages.
//!
//! Delivery is at-least-once: a published event may reach its consumer more
//! than once, and every consumer is written so its effect is idempotent.

use std::future::Future;

use serde::{Deserialize, Serialize};

/// Per-channel destination names. Externally supplied; the defaults match
/// the original deployment's topic names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Topics {
  pub candidates: String,
  pub text:       String,
  pub structured: String,
  pub valid:      String,
  pub review:     String,
  pub duplicate:  String,
}

impl Default for Topics {
  fn default() -> Self {
    Self {
      candidates: "receipts.new".to_string(),
      text:       "receipts.text".to_string(),
      structured: "receipts.parsed".to_string(),
      valid:      "receipts.valid".to_string(),
      review:     "receipts.review".to_string(),
      duplicate:  "receipts.duplicate".to_string(),
    }
  }
}

/// Publisher half of the bus. `publish` returning `Ok` means the event is
/// accepted for (at-least-once) delivery; it says nothing about when or how
/// often the consumer will see it.
pub trait EventBus: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn publish<'a>(
    &'a self,
    topic: &'a str,
    payload: &'a [u8],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
