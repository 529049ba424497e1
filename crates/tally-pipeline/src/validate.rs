//! Validator/Reconciler — schema check, normalization, totals
//! reconciliation, the dedupe decision, and row rendering.
//!
//! Every input produces exactly one outcome: OK, NEEDS_REVIEW (both carry
//! rows and reach the ledger), or a terminal Duplicate (no rows). Problems
//! found along the way become notes, never silent drops.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use iso_currency::Currency;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_core::{
  bus::{EventBus, Topics},
  dedupe::DedupeKey,
  event::StructuredEvent,
  hash::ContentHash,
  outcome::{DuplicateOutcome, LedgerRow, MonthKey, RowStatus, ValidationOutcome},
  record::{NormalizedItem, NormalizedRecord, RawRecord},
  store::{Mark, MarkerStore},
};

use crate::{Error, Result};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
  /// Absolute tolerance when reconciling sum-of-lines against the total.
  pub epsilon:          f64,
  /// ISO 4217 code assumed when the record names none.
  pub default_currency: String,
  /// Fixed UTC offset of the target timezone; month keys and date-only
  /// normalization are derived in this offset.
  pub utc_offset_hours: i32,
  /// Optional base joined with the file id to form each row's file link.
  pub file_link_base:   String,
}

impl Default for ValidatorConfig {
  fn default() -> Self {
    Self {
      epsilon:          0.05,
      default_currency: "MYR".to_string(),
      utc_offset_hours: 8,
      file_link_base:   String::new(),
    }
  }
}

// ─── Decision ────────────────────────────────────────────────────────────────

/// What the validator decided for one structured event.
#[derive(Debug)]
pub enum Decision {
  Write(ValidationOutcome),
  Duplicate(DuplicateOutcome),
}

// ─── Validator ───────────────────────────────────────────────────────────────

pub struct Validator<M, B> {
  markers: M,
  bus:     B,
  topics:  Topics,
  config:  ValidatorConfig,
}

impl<M, B> Validator<M, B>
where
  M: MarkerStore,
  B: EventBus,
{
  pub fn new(markers: M, bus: B, topics: Topics, config: ValidatorConfig) -> Self {
    Self { markers, bus, topics, config }
  }

  pub async fn handle(&self, event: &StructuredEvent) -> Result<()> {
    match self.decide(event, Utc::now()).await? {
      Decision::Write(outcome) => {
        let topic = match outcome.status {
          RowStatus::Ok => &self.topics.valid,
          RowStatus::NeedsReview => &self.topics.review,
        };
        tracing::info!(
          file_id = %outcome.file_id,
          month = %outcome.month_key,
          status = outcome.status.as_str(),
          rows = outcome.rows.len(),
          "validated"
        );
        self
          .bus
          .publish(topic, &serde_json::to_vec(&outcome)?)
          .await
          .map_err(Error::bus)?;
      }
      Decision::Duplicate(dup) => {
        tracing::info!(file_id = %dup.file_id, key = %dup.dedupe_key, "duplicate suppressed");
        self
          .bus
          .publish(&self.topics.duplicate, &serde_json::to_vec(&dup)?)
          .await
          .map_err(Error::bus)?;
      }
    }
    Ok(())
  }

  /// The full decision pipeline. `now` feeds the month-key fallback for
  /// records without a parseable purchase date.
  pub async fn decide(&self, event: &StructuredEvent, now: DateTime<Utc>) -> Result<Decision> {
    let (norm, mut notes, mut needs_review) =
      normalize(event.data.as_ref(), event.image_hash.as_ref(), &self.config);

    if norm.image_hash.is_none() {
      needs_review = true;
      notes.push("content identity missing".to_string());
    }

    // First-writer-wins marker, owned by the file id that created it. A
    // hit by the same owner is redelivery of this very event — proceed,
    // the writer's content-hash check absorbs the repeat. A hit by a
    // different owner on the content hash is conclusive; on the composite
    // fallback it only flags for review — two distinct receipts with the
    // same vendor/date/total would collide on it.
    if let Some(key) = DedupeKey::derive(&norm) {
      match self.markers.mark(&key, &event.file_id).await.map_err(Error::marker)? {
        Mark::Created => {}
        Mark::Existing { owner } if owner == event.file_id => {
          tracing::debug!(file_id = %event.file_id, "own marker found; treating as redelivery");
        }
        Mark::Existing { .. } => {
          if key.is_conclusive() {
            return Ok(Decision::Duplicate(DuplicateOutcome {
              file_id:    event.file_id.clone(),
              dedupe_key: key.storage_key().to_string(),
              norm,
            }));
          }
          needs_review = true;
          notes.push("possible duplicate: vendor/date/total already recorded".to_string());
        }
      }
    }

    let status = if needs_review { RowStatus::NeedsReview } else { RowStatus::Ok };
    let month_key = match norm.purchase_date {
      Some(date) => MonthKey::from_date(date),
      None => MonthKey::current(now, self.offset()),
    };
    let rows = render_rows(&norm, &event.file_id, status, &notes, &self.config);

    Ok(Decision::Write(ValidationOutcome {
      file_id: event.file_id.clone(),
      month_key,
      norm,
      rows,
      notes,
      status,
    }))
  }

  fn offset(&self) -> FixedOffset {
    FixedOffset::east_opt(self.config.utc_offset_hours * 3600)
      .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"))
  }
}

// ─── Normalization ───────────────────────────────────────────────────────────

/// Normalize an untrusted record. Returns the record, the notes collected
/// along the way, and whether anything forces review.
fn normalize(
  data: Option<&RawRecord>,
  event_hash: Option<&ContentHash>,
  config: &ValidatorConfig,
) -> (NormalizedRecord, Vec<String>, bool) {
  let mut notes = Vec::new();

  let Some(data) = data else {
    notes.push("structuring failed: no record produced".to_string());
    return (
      NormalizedRecord::placeholder(event_hash.cloned(), &config.default_currency),
      notes,
      true,
    );
  };

  let mut needs_review = false;

  let vendor = trimmed(data.vendor.as_deref());
  if vendor.is_none() {
    needs_review = true;
    notes.push("vendor missing".to_string());
  }

  let purchase_date = data.purchase_date.as_deref().and_then(parse_date);
  if purchase_date.is_none() {
    needs_review = true;
    notes.push("purchase_date missing or unparseable".to_string());
  }

  let (currency, currency_note) = normalize_currency(data.currency.as_deref(), &config.default_currency);
  if let Some(note) = currency_note {
    needs_review = true;
    notes.push(note);
  }

  // Items: coerce, then derive whichever of unit_price/line_total is
  // missing from the other.
  let mut items = Vec::new();
  if data.items.is_empty() {
    needs_review = true;
    notes.push("no line items".to_string());
  }
  for raw in &data.items {
    let description = trimmed(raw.description.as_deref());
    let mut quantity = coerce_number(raw.quantity.as_ref()).unwrap_or(1.0);
    if quantity <= 0.0 {
      quantity = 1.0;
    }
    let mut unit_price = coerce_number(raw.unit_price.as_ref());
    let mut line_total = coerce_number(raw.line_total.as_ref());

    if line_total.is_none()
      && let Some(unit) = unit_price
    {
      line_total = Some(quantity * unit);
    }
    if unit_price.is_none()
      && let Some(line) = line_total
    {
      unit_price = Some(line / quantity);
    }

    let unit_price = unit_price.map(round2);
    let line_total = line_total.map(round2);

    if description.is_none() || line_total.is_none() {
      needs_review = true;
      notes.push("item missing description or line_total".to_string());
    }
    items.push(NormalizedItem { description, quantity: round2(quantity), unit_price, line_total });
  }

  // Totals: fill whichever of subtotal/tax/total can be derived.
  let mut subtotal = coerce_number(data.subtotal.as_ref());
  let mut tax = coerce_number(data.tax.as_ref());
  let mut total = coerce_number(data.total.as_ref());

  let sum_lines = round2(items.iter().filter_map(|it| it.line_total).sum());
  if subtotal.is_none() && items.iter().any(|it| it.line_total.is_some()) {
    subtotal = Some(sum_lines);
  }
  if total.is_none()
    && let (Some(sub), Some(tx)) = (subtotal, tax)
  {
    total = Some(sub + tx);
  }
  if tax.is_none()
    && let (Some(sub), Some(tot)) = (subtotal, total)
  {
    tax = Some(tot - sub);
  }

  let subtotal = subtotal.map(round2);
  let tax = tax.map(round2);
  let total = total.map(round2);

  match total {
    Some(t) if t > 0.0 => {}
    _ => {
      needs_review = true;
      notes.push("total missing or invalid".to_string());
    }
  }
  if subtotal.is_none() {
    needs_review = true;
    notes.push("subtotal missing".to_string());
  }

  // Reconciliation: tolerate rounding inside epsilon, flag anything bigger.
  if let Some(t) = total
    && (t - sum_lines).abs() > config.epsilon
  {
    needs_review = true;
    notes.push(format!("sum(items) {sum_lines:.2} != total {t:.2}"));
  }

  let image_hash = event_hash
    .cloned()
    .or_else(|| trimmed(data.source_image_hash.as_deref()).map(ContentHash::from_wire));

  let norm = NormalizedRecord {
    vendor,
    purchase_date,
    currency,
    subtotal,
    tax,
    total,
    payment_method: trimmed(data.payment_method.as_deref()),
    items,
    receipt_id: trimmed(data.receipt_id.as_deref()),
    image_hash,
  };
  (norm, notes, needs_review)
}

fn trimmed(s: Option<&str>) -> Option<String> {
  s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Ordered format list; ISO first, then the day-first layouts common on
/// printed receipts.
const DATE_FORMATS: [&str; 7] = [
  "%Y-%m-%d",
  "%Y/%m/%d",
  "%d/%m/%Y",
  "%d-%m-%Y",
  "%d/%m/%y",
  "%d %b %Y",
  "%b %d, %Y",
];

fn parse_date(s: &str) -> Option<NaiveDate> {
  let s = s.trim();
  if s.is_empty() {
    return None;
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.date_naive());
  }
  DATE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Coerce a JSON number or a locale-formatted string ("RM 12.50",
/// "1,299.00") into an f64.
fn coerce_number(value: Option<&Value>) -> Option<f64> {
  match value? {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => {
      let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
      cleaned.parse().ok()
    }
    _ => None,
  }
}

/// Round to two decimals with a tiny nudge so x.005 values land up, not
/// down, under binary float representation.
fn round2(x: f64) -> f64 {
  ((x + 1e-12) * 100.0).round() / 100.0
}

fn normalize_currency(code: Option<&str>, default: &str) -> (String, Option<String>) {
  let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
    return (default.to_string(), None);
  };
  let upper = code.to_uppercase();
  if Currency::from_code(&upper).is_some() {
    (upper, None)
  } else {
    let note = format!("unrecognized currency code {upper:?}");
    (upper, Some(note))
  }
}

// ─── Row rendering ───────────────────────────────────────────────────────────

/// One row per line item, shared header fields repeated, all rows carrying
/// the shared content hash. A record with no items still renders one
/// placeholder row so nothing disappears from the ledger.
fn render_rows(
  norm: &NormalizedRecord,
  file_id: &str,
  status: RowStatus,
  notes: &[String],
  config: &ValidatorConfig,
) -> Vec<LedgerRow> {
  let notes_text = notes.join("; ");
  let file_link = if config.file_link_base.is_empty() {
    file_id.to_string()
  } else {
    format!("{}/{}", config.file_link_base.trim_end_matches('/'), file_id)
  };

  let base = |item: Option<&NormalizedItem>| LedgerRow {
    date:           norm.purchase_date,
    vendor:         norm.vendor.clone(),
    item:           item.and_then(|it| it.description.clone()),
    qty:            item.map(|it| it.quantity),
    unit_price:     item.and_then(|it| it.unit_price),
    line_total:     item.and_then(|it| it.line_total),
    subtotal:       norm.subtotal,
    tax:            norm.tax,
    total:          norm.total,
    currency:       norm.currency.clone(),
    payment_method: norm.payment_method.clone(),
    receipt_id:     norm.receipt_id.clone(),
    image_hash:     norm.image_hash.clone(),
    status,
    notes:          notes_text.clone(),
    file_link:      file_link.clone(),
  };

  if norm.items.is_empty() {
    vec![base(None)]
  } else {
    norm.items.iter().map(|item| base(Some(item))).collect()
  }
}

#[cfg(test)]
mod tests {
  use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, Mutex},
  };

  use serde_json::json;
  use tally_core::record::RawItem;

  use super::*;
  use crate::bus::MemoryBus;

  /// In-memory first-writer-wins markers.
  #[derive(Clone, Default)]
  struct FakeMarkers {
    seen: Arc<Mutex<HashMap<String, String>>>,
  }

  impl MarkerStore for FakeMarkers {
    type Error = Infallible;

    async fn mark(&self, key: &DedupeKey, owner: &str) -> Result<Mark, Infallible> {
      let mut seen = self.seen.lock().unwrap();
      match seen.get(key.storage_key()) {
        Some(existing) => Ok(Mark::Existing { owner: existing.clone() }),
        None => {
          seen.insert(key.storage_key().to_string(), owner.to_string());
          Ok(Mark::Created)
        }
      }
    }
  }

  fn validator() -> Validator<FakeMarkers, MemoryBus> {
    Validator::new(
      FakeMarkers::default(),
      MemoryBus::new(),
      Topics::default(),
      ValidatorConfig::default(),
    )
  }

  fn record(total: f64, line_totals: &[f64]) -> RawRecord {
    RawRecord {
      vendor:        Some("Cafe Uno".into()),
      purchase_date: Some("2025-09-21".into()),
      currency:      Some("MYR".into()),
      total:         Some(json!(total)),
      items:         line_totals
        .iter()
        .enumerate()
        .map(|(i, lt)| RawItem {
          description: Some(format!("item-{i}")),
          quantity:    Some(json!(1)),
          unit_price:  Some(json!(lt)),
          line_total:  Some(json!(lt)),
        })
        .collect(),
      ..RawRecord::default()
    }
  }

  fn event(data: Option<RawRecord>, bytes: &[u8]) -> StructuredEvent {
    StructuredEvent {
      file_id:    "inbox/r1".into(),
      image_hash: Some(ContentHash::digest(bytes)),
      data,
      llm_meta:   json!({}),
    }
  }

  async fn decide(v: &Validator<FakeMarkers, MemoryBus>, e: &StructuredEvent) -> Decision {
    v.decide(e, Utc::now()).await.unwrap()
  }

  // ── Normalization ─────────────────────────────────────────────────────────

  #[test]
  fn parses_common_date_layouts() {
    let expected = NaiveDate::from_ymd_opt(2025, 9, 21).unwrap();
    for s in ["2025-09-21", "2025/09/21", "21/09/2025", "21-09-2025", "21/09/25", "21 Sep 2025", "Sep 21, 2025"] {
      assert_eq!(parse_date(s), Some(expected), "format: {s}");
    }
    assert_eq!(parse_date("not a date"), None);
    assert_eq!(parse_date(""), None);
  }

  #[test]
  fn coerces_locale_formatted_numbers() {
    assert_eq!(coerce_number(Some(&json!(12.5))), Some(12.5));
    assert_eq!(coerce_number(Some(&json!("RM 12.50"))), Some(12.5));
    assert_eq!(coerce_number(Some(&json!("1,299.00"))), Some(1299.0));
    assert_eq!(coerce_number(Some(&json!("-3.20"))), Some(-3.2));
    assert_eq!(coerce_number(Some(&json!("free"))), None);
    assert_eq!(coerce_number(None), None);
  }

  #[test]
  fn derives_missing_item_fields() {
    let raw = RawRecord {
      vendor:        Some("Shop".into()),
      purchase_date: Some("2025-09-21".into()),
      total:         Some(json!(9.0)),
      items:         vec![RawItem {
        description: Some("threes".into()),
        quantity:    Some(json!(3)),
        unit_price:  Some(json!(3.0)),
        line_total:  None,
      }],
      ..RawRecord::default()
    };
    let (norm, _, _) = normalize(Some(&raw), None, &ValidatorConfig::default());
    assert_eq!(norm.items[0].line_total, Some(9.0));
    // Subtotal backfilled from the line sum, tax derived from the rest.
    assert_eq!(norm.subtotal, Some(9.0));
    assert_eq!(norm.tax, Some(0.0));
  }

  #[test]
  fn defaults_currency_and_flags_unknown_codes() {
    let config = ValidatorConfig::default();
    let (currency, note) = normalize_currency(None, &config.default_currency);
    assert_eq!(currency, "MYR");
    assert!(note.is_none());

    let (currency, note) = normalize_currency(Some("usd"), &config.default_currency);
    assert_eq!(currency, "USD");
    assert!(note.is_none());

    let (currency, note) = normalize_currency(Some("ZZZ"), &config.default_currency);
    assert_eq!(currency, "ZZZ");
    assert!(note.is_some());
  }

  // ── Reconciliation ────────────────────────────────────────────────────────

  #[tokio::test]
  async fn within_epsilon_is_ok() {
    let v = validator();
    // lines sum to 22.98; total 23.00; |diff| = 0.02 <= 0.05
    let e = event(Some(record(23.00, &[10.49, 12.49])), b"r1");
    match decide(&v, &e).await {
      Decision::Write(outcome) => {
        assert_eq!(outcome.status, RowStatus::Ok);
        assert!(outcome.notes.is_empty(), "notes: {:?}", outcome.notes);
      }
      other => panic!("expected write, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn beyond_epsilon_forces_review_with_note() {
    let v = validator();
    let e = event(Some(record(25.00, &[10.0, 12.0])), b"r1");
    match decide(&v, &e).await {
      Decision::Write(outcome) => {
        assert_eq!(outcome.status, RowStatus::NeedsReview);
        assert!(outcome.notes.iter().any(|n| n.contains("!= total")), "notes: {:?}", outcome.notes);
        // Review outcomes still carry rows; they reach the ledger flagged.
        assert_eq!(outcome.rows.len(), 2);
      }
      other => panic!("expected write, got {other:?}"),
    }
  }

  // ── Schema failures route to review, never drop ──────────────────────────

  #[tokio::test]
  async fn null_record_renders_placeholder_row() {
    let v = validator();
    let e = event(None, b"r1");
    match decide(&v, &e).await {
      Decision::Write(outcome) => {
        assert_eq!(outcome.status, RowStatus::NeedsReview);
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].image_hash, Some(ContentHash::digest(b"r1")));
        assert!(outcome.notes.iter().any(|n| n.contains("structuring failed")));
        assert_eq!(outcome.rows[0].file_link, "inbox/r1");
      }
      other => panic!("expected write, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn missing_vendor_is_a_note_not_a_drop() {
    let v = validator();
    let mut raw = record(23.0, &[23.0]);
    raw.vendor = None;
    match decide(&v, &event(Some(raw), b"r1")).await {
      Decision::Write(outcome) => {
        assert_eq!(outcome.status, RowStatus::NeedsReview);
        assert!(outcome.notes.iter().any(|n| n == "vendor missing"));
      }
      other => panic!("expected write, got {other:?}"),
    }
  }

  // ── Dedupe ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn same_content_from_a_different_file_is_duplicate() {
    let v = validator();
    // Two upload events for the same photo: distinct file ids, identical
    // bytes, so identical content hashes.
    let first = event(Some(record(23.0, &[23.0])), b"same-bytes");
    let mut second = event(Some(record(23.0, &[23.0])), b"same-bytes");
    second.file_id = "inbox/r1-rescan".into();

    assert!(matches!(decide(&v, &first).await, Decision::Write(_)));
    match decide(&v, &second).await {
      Decision::Duplicate(dup) => {
        assert_eq!(dup.dedupe_key, ContentHash::digest(b"same-bytes").as_str());
        assert_eq!(dup.file_id, "inbox/r1-rescan");
      }
      other => panic!("expected duplicate, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn redelivery_of_the_same_event_is_not_a_duplicate() {
    // The bus may deliver the same structured event twice (or the
    // validator may be retried after marking but before publishing).
    // Hitting our own marker must not suppress the receipt — the writer's
    // idempotent append is the layer that absorbs the repeat.
    let v = validator();
    let e = event(Some(record(23.0, &[23.0])), b"same-bytes");
    assert!(matches!(decide(&v, &e).await, Decision::Write(_)));
    match decide(&v, &e).await {
      Decision::Write(outcome) => assert_eq!(outcome.status, RowStatus::Ok),
      other => panic!("redelivery must still produce a write, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn composite_key_collision_flags_review_instead_of_merging() {
    let v = validator();
    // No content hash on either event: the fallback key is vendor|date|total.
    let mut first = event(Some(record(23.0, &[23.0])), b"a");
    first.image_hash = None;
    let mut second = event(Some(record(23.0, &[23.0])), b"b");
    second.image_hash = None;
    second.file_id = "inbox/r2".into();

    assert!(matches!(decide(&v, &first).await, Decision::Write(_)));
    match decide(&v, &second).await {
      Decision::Write(outcome) => {
        assert_eq!(outcome.status, RowStatus::NeedsReview);
        assert!(outcome.notes.iter().any(|n| n.contains("possible duplicate")));
      }
      other => panic!("fallback collision must not be terminal: {other:?}"),
    }
  }

  #[tokio::test]
  async fn missing_content_identity_is_flagged() {
    let v = validator();
    let mut e = event(Some(record(23.0, &[23.0])), b"a");
    e.image_hash = None;
    match decide(&v, &e).await {
      Decision::Write(outcome) => {
        assert!(outcome.notes.iter().any(|n| n == "content identity missing"));
        assert_eq!(outcome.status, RowStatus::NeedsReview);
      }
      other => panic!("expected write, got {other:?}"),
    }
  }

  // ── Rows and month key ────────────────────────────────────────────────────

  #[tokio::test]
  async fn one_row_per_item_sharing_the_hash() {
    let v = validator();
    let e = event(Some(record(23.0, &[10.0, 13.0])), b"multi");
    match decide(&v, &e).await {
      Decision::Write(outcome) => {
        assert_eq!(outcome.rows.len(), 2);
        let hash = Some(ContentHash::digest(b"multi"));
        assert!(outcome.rows.iter().all(|r| r.image_hash == hash));
        assert!(outcome.rows.iter().all(|r| r.total == Some(23.0)));
        assert_eq!(outcome.month_key.as_str(), "2025-09");
      }
      other => panic!("expected write, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn missing_date_falls_back_to_current_month() {
    let v = validator();
    let mut raw = record(23.0, &[23.0]);
    raw.purchase_date = None;
    let now = Utc::now();
    match v.decide(&event(Some(raw), b"r1"), now).await.unwrap() {
      Decision::Write(outcome) => {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        assert_eq!(outcome.month_key, MonthKey::current(now, offset));
      }
      other => panic!("expected write, got {other:?}"),
    }
  }

  // ── handle() routing ──────────────────────────────────────────────────────

  #[tokio::test]
  async fn handle_routes_to_the_right_topics() {
    let bus = MemoryBus::new();
    let topics = Topics::default();
    let mut valid_rx = bus.subscribe(&topics.valid);
    let mut review_rx = bus.subscribe(&topics.review);
    let mut dup_rx = bus.subscribe(&topics.duplicate);

    let v = Validator::new(FakeMarkers::default(), bus, topics, ValidatorConfig::default());

    // Clean record → valid.
    v.handle(&event(Some(record(23.0, &[23.0])), b"ok")).await.unwrap();
    let outcome: ValidationOutcome = serde_json::from_slice(&valid_rx.recv().await.unwrap()).unwrap();
    assert_eq!(outcome.status, RowStatus::Ok);

    // Same content from a different file → duplicate.
    let mut rescan = event(Some(record(23.0, &[23.0])), b"ok");
    rescan.file_id = "inbox/rescan".into();
    v.handle(&rescan).await.unwrap();
    let dup: DuplicateOutcome = serde_json::from_slice(&dup_rx.recv().await.unwrap()).unwrap();
    assert_eq!(dup.dedupe_key, ContentHash::digest(b"ok").as_str());

    // Null record → review.
    v.handle(&event(None, b"broken")).await.unwrap();
    let review: ValidationOutcome = serde_json::from_slice(&review_rx.recv().await.unwrap()).unwrap();
    assert_eq!(review.status, RowStatus::NeedsReview);
  }
}
