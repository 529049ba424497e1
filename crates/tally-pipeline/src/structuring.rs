//! Structuring Stage — the opaque text-to-record transform.
//!
//! The stage itself is a thin wrapper: it never retries the collaborator,
//! never trusts its output, and always emits exactly one structured event
//! per input — with a null record when the collaborator failed, so the
//! validator can route the receipt to review instead of losing it.

use std::{convert::Infallible, time::Duration};

use serde_json::json;
use tally_core::{
  bus::{EventBus, Topics},
  engine::{Structured, Structurer},
  event::{StructuredEvent, TextEvent},
  hash::ContentHash,
  record::RawRecord,
};

use crate::{Error, Result};

pub struct StructuringStage<X, B> {
  structurer: X,
  bus:        B,
  topics:     Topics,
}

impl<X, B> StructuringStage<X, B>
where
  X: Structurer,
  B: EventBus,
{
  pub fn new(structurer: X, bus: B, topics: Topics) -> Self {
    Self { structurer, bus, topics }
  }

  pub async fn handle(&self, event: &TextEvent) -> Result<()> {
    let structured = if event.text.trim().is_empty() {
      // Nothing to parse; don't bother the collaborator.
      Structured { record: None, meta: json!({ "reason": "empty_text" }) }
    } else {
      match self.structurer.structure(&event.text, Some(&event.image_hash)).await {
        Ok(structured) => structured,
        Err(error) => {
          tracing::warn!(%error, file_id = %event.file_id, "structuring failed; emitting null record");
          Structured {
            record: None,
            meta:   json!({ "reason": "structurer_error", "error": error.to_string() }),
          }
        }
      }
    };

    let out = StructuredEvent {
      file_id:    event.file_id.clone(),
      image_hash: Some(event.image_hash.clone()),
      data:       structured.record,
      llm_meta:   structured.meta,
    };
    self
      .bus
      .publish(&self.topics.structured, &serde_json::to_vec(&out)?)
      .await
      .map_err(Error::bus)?;
    Ok(())
  }
}

// ─── Backends ────────────────────────────────────────────────────────────────

/// HTTP structuring collaborator: posts `{text, image_hash}` to a
/// configured endpoint and expects a record back. Bounded by the client
/// timeout; transport and decode failures surface as errors which the
/// stage converts to a null record.
pub struct HttpStructurer {
  client:   reqwest::Client,
  endpoint: String,
}

impl HttpStructurer {
  pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client, endpoint: endpoint.into() })
  }
}

impl Structurer for HttpStructurer {
  type Error = reqwest::Error;

  async fn structure(
    &self,
    text: &str,
    image_hash: Option<&ContentHash>,
  ) -> Result<Structured, reqwest::Error> {
    let body = json!({
      "text": text,
      "image_hash": image_hash.map(|h| h.as_str()),
    });
    let record: RawRecord = self
      .client
      .post(&self.endpoint)
      .json(&body)
      .send()
      .await?
      .error_for_status()?
      .json()
      .await?;
    Ok(Structured { record: Some(record), meta: json!({ "endpoint": self.endpoint }) })
  }
}

/// Backend selected by configuration: a real HTTP endpoint, or disabled —
/// in which case everything structures to null and flows to review.
pub enum StructurerBackend {
  Http(HttpStructurer),
  Disabled,
}

impl Structurer for StructurerBackend {
  type Error = reqwest::Error;

  async fn structure(
    &self,
    text: &str,
    image_hash: Option<&ContentHash>,
  ) -> Result<Structured, reqwest::Error> {
    match self {
      Self::Http(inner) => inner.structure(text, image_hash).await,
      Self::Disabled => Ok(Structured {
        record: None,
        meta:   json!({ "reason": "structurer_disabled" }),
      }),
    }
  }
}

/// Structurer for tests: returns a fixed record.
pub struct FixedStructurer(pub Option<RawRecord>);

impl Structurer for FixedStructurer {
  type Error = Infallible;

  async fn structure(
    &self,
    _text: &str,
    image_hash: Option<&ContentHash>,
  ) -> Result<Structured, Infallible> {
    let mut record = self.0.clone();
    if let Some(record) = record.as_mut()
      && record.source_image_hash.is_none()
    {
      record.source_image_hash = image_hash.map(|h| h.as_str().to_string());
    }
    Ok(Structured { record, meta: json!({ "fixture": true }) })
  }
}
