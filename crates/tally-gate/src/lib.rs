//! The Intake Gate — the single normalization point for "one candidate
//! receipt, one event".
//!
//! Authenticates the caller with a shared static key, validates the file
//! descriptor, assigns the deterministic idempotency key, and admits the
//! candidate onto the event bus. No dedupe decision is made here; that
//! belongs to the validator and the ledger writer.

pub mod auth;
pub mod error;

pub use error::Error;

use std::sync::Arc;

use axum::{
  Json, Router,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  routing::{get, post},
};
use bytes::Bytes;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tally_core::{
  bus::{EventBus, Topics},
  event::CandidateEvent,
  outcome::{MonthKey, render_sheet},
  store::LedgerStore,
};
use tower_http::trace::TraceLayer;

use auth::verify_api_key;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime gate configuration, injected at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
  pub host:    String,
  pub port:    u16,
  pub api_key: String,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<B, L> {
  pub bus:    Arc<B>,
  pub ledger: Arc<L>,
  pub topics: Arc<Topics>,
  pub config: Arc<GateConfig>,
}

impl<B, L> Clone for AppState<B, L> {
  fn clone(&self) -> Self {
    Self {
      bus:    self.bus.clone(),
      ledger: self.ledger.clone(),
      topics: self.topics.clone(),
      config: self.config.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the gate router: candidate intake, a read view over the monthly
/// ledgers, and a health probe.
pub fn router<B, L>(state: AppState<B, L>) -> Router
where
  B: EventBus + 'static,
  L: LedgerStore + 'static,
{
  Router::new()
    .route("/ingest", post(ingest::<B, L>))
    .route("/ledgers/{month}", get(ledger_sheet::<B, L>))
    .route("/healthz", get(healthz))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Idempotency key ─────────────────────────────────────────────────────────

/// Deterministic idempotency key: SHA-256 over `"<fileId>:<createdTime>"`.
/// Re-delivery of the same descriptor always yields the same key — never a
/// random value.
pub fn idempotency_key(file_id: &str, created_time: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(file_id.as_bytes());
  hasher.update(b":");
  hasher.update(created_time.as_bytes());
  hex::encode(hasher.finalize())
}

// ─── Handlers ────────────────────────────────────────────────────────────────

/// Inbound descriptor. `createdTime` stays a string until validated so the
/// idempotency key is derived from the caller's exact bytes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestRequest {
  file_id:      String,
  name:         String,
  mime_type:    String,
  created_time: String,
  folder_id:    String,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
  status:          &'static str,
  idempotency_key: String,
}

async fn ingest<B, L>(
  State(state): State<AppState<B, L>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<IngestResponse>, Error>
where
  B: EventBus,
  L: LedgerStore,
{
  // Auth before touching the body.
  verify_api_key(&headers, &state.config.api_key)?;

  let req: IngestRequest = serde_json::from_slice(&body)
    .map_err(|e| Error::BadRequest(format!("invalid JSON body: {e}")))?;

  if req.file_id.trim().is_empty() {
    return Err(Error::BadRequest("fileId is empty".to_string()));
  }
  if !req.mime_type.contains('/') {
    return Err(Error::BadRequest(format!("mimeType looks invalid: {:?}", req.mime_type)));
  }
  let created_time = DateTime::parse_from_rfc3339(&req.created_time)
    .map_err(|e| Error::BadRequest(format!("createdTime is not RFC 3339: {e}")))?
    .to_utc();

  let idempotency_key = idempotency_key(&req.file_id, &req.created_time);

  let event = CandidateEvent {
    file_id: req.file_id,
    name: req.name,
    mime_type: req.mime_type,
    created_time,
    folder_id: req.folder_id,
    idempotency_key: idempotency_key.clone(),
  };
  let payload = serde_json::to_vec(&event).map_err(|e| Error::Internal(e.to_string()))?;

  state
    .bus
    .publish(&state.topics.candidates, &payload)
    .await
    .map_err(|e| Error::Internal(format!("publish failed: {e}")))?;

  tracing::info!(file_id = %event.file_id, key = %idempotency_key, "candidate admitted");
  Ok(Json(IngestResponse { status: "ok", idempotency_key }))
}

#[derive(Debug, Serialize)]
struct SheetResponse {
  month: String,
  sheet: Vec<Vec<String>>,
}

/// Render one monthly ledger — header, rows, and the `MONTH TOTAL` footer.
async fn ledger_sheet<B, L>(
  State(state): State<AppState<B, L>>,
  Path(month): Path<String>,
  headers: HeaderMap,
) -> Result<Json<SheetResponse>, Error>
where
  B: EventBus,
  L: LedgerStore,
{
  verify_api_key(&headers, &state.config.api_key)?;
  let month = MonthKey::parse(&month)
    .map_err(|_| Error::BadRequest(format!("month must be YYYY-MM, got {month:?}")))?;

  let rows = state
    .ledger
    .rows(&month)
    .await
    .map_err(|e| Error::Internal(e.to_string()))?;
  let aggregate = state
    .ledger
    .aggregate(&month)
    .await
    .map_err(|e| Error::Internal(e.to_string()))?
    .unwrap_or(0.0);

  Ok(Json(SheetResponse {
    month: month.to_string(),
    sheet: render_sheet(&rows, aggregate),
  }))
}

async fn healthz() -> StatusCode {
  StatusCode::OK
}

// ─── Integration tests ────────────────────────────────────────────────────────
