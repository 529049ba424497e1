//! External text-extraction and structuring collaborators, specified at
//! their interface boundaries.
//!
//! How OCR or the language model actually work is out of scope; the
//! pipeline only needs these shapes of data in and out.

use std::future::Future;

use crate::{hash::ContentHash, record::RawRecord};

/// Result of running a text engine over file bytes.
#[derive(Debug, Clone)]
pub struct ExtractedText {
  pub text:       String,
  /// 0.0..=1.0; embedded text layers report 1.0.
  pub confidence: f64,
  pub pages:      u32,
}

/// Cheap embedded-text extraction (a PDF text layer, a plain-text body).
/// Tried first; OCR is the fallback when the yield is too small.
pub trait TextLayer: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Engine marker recorded in `ocr_meta.engine`.
  fn name(&self) -> &'static str;

  fn extract<'a>(
    &'a self,
    bytes: &'a [u8],
    mime_type: &'a str,
  ) -> impl Future<Output = Result<ExtractedText, Self::Error>> + Send + 'a;
}

/// An external OCR service.
pub trait OcrEngine: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Engine marker recorded in `ocr_meta.engine`.
  fn name(&self) -> &'static str;

  fn recognize<'a>(
    &'a self,
    bytes: &'a [u8],
    mime_type: &'a str,
  ) -> impl Future<Output = Result<ExtractedText, Self::Error>> + Send + 'a;
}

/// What the structuring stage hands back: a best-effort record (or `None`)
/// plus free-form diagnostic metadata.
#[derive(Debug, Clone)]
pub struct Structured {
  pub record: Option<RawRecord>,
  pub meta:   serde_json::Value,
}

/// The opaque structuring stage: text in, best-effort record out. No
/// dedupe responsibility, no consistency guarantees — everything it returns
/// is re-validated downstream.
pub trait Structurer: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn structure<'a>(
    &'a self,
    text: &'a str,
    image_hash: Option<&'a ContentHash>,
  ) -> impl Future<Output = Result<Structured, Self::Error>> + Send + 'a;
}
