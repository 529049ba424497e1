//! Stage wiring — one consumer loop per bus topic.
//!
//! Each loop deserializes, then runs the stage handler under the shared
//! retry policy: a handler error is a nack, retried with backoff up to the
//! attempt budget (bounded redelivery). An exhausted budget is a logged
//! failure — the event had no externally visible effect, matching the
//! all-or-nothing contract of every stage.

use std::{fmt, future::Future, sync::Arc};

use serde::de::DeserializeOwned;
use tally_core::{
  bus::Topics,
  engine::{OcrEngine, Structurer, TextLayer},
  event::{CandidateEvent, StructuredEvent, TextEvent},
  outcome::{DuplicateOutcome, ValidationOutcome},
  retry::RetryPolicy,
  source::SourceStore,
  store::{LedgerStore, MarkerStore},
};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
  bus::MemoryBus,
  extract::ContentExtractor,
  structuring::StructuringStage,
  validate::Validator,
  writer::LedgerWriter,
};

/// Consume one topic until its sender side is gone. Undecodable payloads
/// are logged and dropped — redelivering them could never succeed.
pub async fn consume<T, E, F, Fut>(
  topic: String,
  mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
  policy: RetryPolicy,
  handler: F,
) where
  T: DeserializeOwned + Clone,
  E: fmt::Display,
  F: Fn(T) -> Fut,
  Fut: Future<Output = Result<(), E>>,
{
  while let Some(payload) = rx.recv().await {
    let event: T = match serde_json::from_slice(&payload) {
      Ok(event) => event,
      Err(error) => {
        tracing::error!(%topic, %error, "undecodable event; dropping");
        continue;
      }
    };
    if let Err(error) = policy.run(|| handler(event.clone())).await {
      tracing::error!(%topic, %error, "handler failed after retries; giving up on event");
    }
  }
  tracing::debug!(%topic, "consumer loop ended");
}

/// Subscribe every stage to its topic and spawn the consumer loops.
/// Dropping the bus's last publisher ends the loops.
pub fn spawn_stages<S, T, O, X, M, L>(
  bus: &MemoryBus,
  topics: &Topics,
  policy: RetryPolicy,
  extractor: ContentExtractor<S, T, O, MemoryBus>,
  structuring: StructuringStage<X, MemoryBus>,
  validator: Validator<M, MemoryBus>,
  writer: LedgerWriter<L>,
) -> Vec<JoinHandle<()>>
where
  S: SourceStore + Send + Sync + 'static,
  T: TextLayer + Send + Sync + 'static,
  O: OcrEngine + Send + Sync + 'static,
  X: Structurer + Send + Sync + 'static,
  M: MarkerStore + Send + Sync + 'static,
  L: LedgerStore + Send + Sync + 'static,
{
  let mut handles = Vec::new();

  let extractor = Arc::new(extractor);
  let rx = bus.subscribe(&topics.candidates);
  handles.push(tokio::spawn(consume(
    topics.candidates.clone(),
    rx,
    policy,
    move |event: CandidateEvent| {
      let extractor = extractor.clone();
      async move { extractor.handle(&event).await }
    },
  )));

  let structuring = Arc::new(structuring);
  let rx = bus.subscribe(&topics.text);
  handles.push(tokio::spawn(consume(
    topics.text.clone(),
    rx,
    policy,
    move |event: TextEvent| {
      let structuring = structuring.clone();
      async move { structuring.handle(&event).await }
    },
  )));

  let validator = Arc::new(validator);
  let rx = bus.subscribe(&topics.structured);
  handles.push(tokio::spawn(consume(
    topics.structured.clone(),
    rx,
    policy,
    move |event: StructuredEvent| {
      let validator = validator.clone();
      async move { validator.handle(&event).await }
    },
  )));

  // OK and review outcomes both reach the writer; review rows just carry
  // their status flag.
  let writer = Arc::new(writer);
  for topic in [topics.valid.clone(), topics.review.clone()] {
    let rx = bus.subscribe(&topic);
    let writer = writer.clone();
    handles.push(tokio::spawn(consume(
      topic,
      rx,
      policy,
      move |outcome: ValidationOutcome| {
        let writer = writer.clone();
        async move { writer.apply(&outcome).await.map(|_| ()) }
      },
    )));
  }

  // Duplicates are a normal terminal outcome; record and move on.
  let rx = bus.subscribe(&topics.duplicate);
  handles.push(tokio::spawn(consume(
    topics.duplicate.clone(),
    rx,
    policy,
    |dup: DuplicateOutcome| async move {
      tracing::info!(file_id = %dup.file_id, key = %dup.dedupe_key, "duplicate receipt suppressed");
      Ok::<(), std::convert::Infallible>(())
    },
  )));

  handles
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use tally_core::bus::EventBus as _;

  use super::*;

  #[tokio::test]
  async fn consumer_retries_until_handler_succeeds() {
    let bus = MemoryBus::new();
    let rx = bus.subscribe("t");
    let attempts = Arc::new(AtomicUsize::new(0));

    let counted = attempts.clone();
    let policy = RetryPolicy { max_attempts: 3, base_delay_ms: 1, multiplier: 1.0 };
    let task = tokio::spawn(consume(
      "t".to_string(),
      rx,
      policy,
      move |_event: serde_json::Value| {
        let counted = counted.clone();
        async move {
          if counted.fetch_add(1, Ordering::SeqCst) < 2 {
            Err("transient".to_string())
          } else {
            Ok(())
          }
        }
      },
    ));

    bus.publish("t", b"{}").await.unwrap();
    drop(bus);
    task.await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn poison_messages_are_dropped_not_retried() {
    let bus = MemoryBus::new();
    let rx = bus.subscribe("t");
    let attempts = Arc::new(AtomicUsize::new(0));

    let counted = attempts.clone();
    let task = tokio::spawn(consume(
      "t".to_string(),
      rx,
      RetryPolicy::none(),
      move |_event: CandidateEvent| {
        let counted = counted.clone();
        async move {
          counted.fetch_add(1, Ordering::SeqCst);
          Ok::<(), std::convert::Infallible>(())
        }
      },
    ));

    bus.publish("t", b"not json").await.unwrap();
    drop(bus);
    task.await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
  }
}
