//! Content Extractor — fetch bytes, derive the content identity, extract
//! text.
//!
//! The hash computed here is the durable identity of the receipt; every
//! later stage carries it unchanged. Text extraction prefers a cheap
//! embedded text layer and falls back to OCR when the yield is below the
//! configured minimum.

use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use tally_core::{
  bus::{EventBus, Topics},
  engine::{ExtractedText, OcrEngine, TextLayer},
  event::{CandidateEvent, OcrMeta, TextEvent},
  hash::ContentHash,
  source::SourceStore,
};

use crate::{Error, Result};

/// Engine marker for media types no engine can handle. Terminal: the event
/// still flows downstream (empty text) so the validator parks it in review
/// instead of the bus retrying forever.
pub const ENGINE_UNSUPPORTED: &str = "unsupported";

/// Engine marker for an extraction attempt that failed outright.
pub const ENGINE_FAILED: &str = "failed";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
  /// Minimum characters an embedded text layer must yield before OCR is
  /// skipped.
  pub min_text_chars: usize,
}

impl Default for ExtractorConfig {
  fn default() -> Self {
    Self { min_text_chars: 120 }
  }
}

pub struct ContentExtractor<S, T, O, B> {
  source:     S,
  text_layer: T,
  ocr:        O,
  bus:        B,
  topics:     Topics,
  config:     ExtractorConfig,
}

impl<S, T, O, B> ContentExtractor<S, T, O, B>
where
  S: SourceStore,
  T: TextLayer,
  O: OcrEngine,
  B: EventBus,
{
  pub fn new(source: S, text_layer: T, ocr: O, bus: B, topics: Topics, config: ExtractorConfig) -> Self {
    Self { source, text_layer, ocr, bus, topics, config }
  }

  /// Handle one candidate. A store fetch failure propagates so the bus
  /// redelivers; extraction failures do not — they emit an event with
  /// empty text and an explicit marker.
  pub async fn handle(&self, event: &CandidateEvent) -> Result<()> {
    let bytes = self
      .source
      .fetch_bytes(&event.file_id)
      .await
      .map_err(Error::source_store)?;
    let image_hash = ContentHash::digest(&bytes);

    let (text, meta) = self.extract_text(&bytes, &event.mime_type).await;
    tracing::info!(
      file_id = %event.file_id,
      engine = %meta.engine,
      chars = text.len(),
      confidence = meta.confidence,
      "text extracted"
    );

    let out = TextEvent {
      file_id:      event.file_id.clone(),
      name:         event.name.clone(),
      created_time: event.created_time,
      image_hash,
      text,
      ocr_meta:     meta,
    };
    self
      .bus
      .publish(&self.topics.text, &serde_json::to_vec(&out)?)
      .await
      .map_err(Error::bus)?;
    Ok(())
  }

  async fn extract_text(&self, bytes: &[u8], mime_type: &str) -> (String, OcrMeta) {
    if mime_type == "application/pdf" {
      // Embedded text layer first; OCR only when the yield is too small.
      if let Ok(extracted) = self.text_layer.extract(bytes, mime_type).await
        && extracted.text.trim().len() >= self.config.min_text_chars
      {
        return finish(extracted, self.text_layer.name());
      }
      return self.run_ocr(bytes, mime_type).await;
    }

    if mime_type.starts_with("image/") {
      return self.run_ocr(bytes, mime_type).await;
    }

    if mime_type.starts_with("text/") {
      return match self.text_layer.extract(bytes, mime_type).await {
        Ok(extracted) => finish(extracted, self.text_layer.name()),
        Err(_) => failed(),
      };
    }

    (
      String::new(),
      OcrMeta { engine: ENGINE_UNSUPPORTED.to_string(), confidence: 0.0, pages: 0 },
    )
  }

  async fn run_ocr(&self, bytes: &[u8], mime_type: &str) -> (String, OcrMeta) {
    match self.ocr.recognize(bytes, mime_type).await {
      Ok(extracted) => finish(extracted, self.ocr.name()),
      Err(error) => {
        tracing::error!(%error, engine = self.ocr.name(), "ocr failed");
        failed()
      }
    }
  }
}

fn finish(extracted: ExtractedText, engine: &str) -> (String, OcrMeta) {
  (
    extracted.text,
    OcrMeta {
      engine:     engine.to_string(),
      confidence: extracted.confidence,
      pages:      extracted.pages.max(1),
    },
  )
}

fn failed() -> (String, OcrMeta) {
  (
    String::new(),
    OcrMeta { engine: ENGINE_FAILED.to_string(), confidence: 0.0, pages: 1 },
  )
}

// ─── Built-in engines ────────────────────────────────────────────────────────

/// Text layer for plain-text media: decodes the bytes as UTF-8. PDFs and
/// images always fall through to OCR.
#[derive(Clone, Default)]
pub struct Utf8TextLayer;

impl TextLayer for Utf8TextLayer {
  type Error = Infallible;

  fn name(&self) -> &'static str {
    "utf8_text"
  }

  async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<ExtractedText, Infallible> {
    let text = if mime_type.starts_with("text/") {
      String::from_utf8_lossy(bytes).into_owned()
    } else {
      String::new()
    };
    Ok(ExtractedText { text, confidence: 1.0, pages: 1 })
  }
}

/// Placeholder OCR for deployments without a configured engine: every
/// recognition attempt fails, so image receipts land in review rather than
/// being silently dropped.
#[derive(Clone, Default)]
pub struct DisabledOcr;

#[derive(Debug, thiserror::Error)]
#[error("no OCR engine configured")]
pub struct OcrDisabled;

impl OcrEngine for DisabledOcr {
  type Error = OcrDisabled;

  fn name(&self) -> &'static str {
    "disabled"
  }

  async fn recognize(&self, _bytes: &[u8], _mime_type: &str) -> Result<ExtractedText, OcrDisabled> {
    Err(OcrDisabled)
  }
}
