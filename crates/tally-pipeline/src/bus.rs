//! In-process event bus with at-least-once semantics.
//!
//! One consumer per topic; events published before the consumer attaches
//! are buffered and delivered first. Redelivery on handler failure is the
//! consumer loop's job (see [`crate::run`]) — the bus itself only
//! guarantees that an accepted publish is eventually delivered at least
//! once while the consumer lives.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
};

use tally_core::bus::EventBus;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum BusError {
  /// The topic's consumer has shut down; the event cannot be delivered.
  #[error("topic consumer gone: {0}")]
  ConsumerGone(String),
}

#[derive(Default)]
struct TopicState {
  sender:  Option<mpsc::UnboundedSender<Vec<u8>>>,
  pending: Vec<Vec<u8>>,
}

/// Cheap to clone; all clones share the same topics.
#[derive(Clone, Default)]
pub struct MemoryBus {
  topics: Arc<Mutex<HashMap<String, TopicState>>>,
}

impl MemoryBus {
  pub fn new() -> Self {
    Self::default()
  }

  /// Attach the consumer for `topic`, draining any events published before
  /// it existed. One consumer per topic; attaching again replaces it.
  pub fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut topics = self.topics.lock().expect("bus lock");
    let state = topics.entry(topic.to_string()).or_default();
    for payload in state.pending.drain(..) {
      // Receiver is brand new and in scope; this cannot fail.
      let _ = tx.send(payload);
    }
    state.sender = Some(tx);
    rx
  }
}

impl EventBus for MemoryBus {
  type Error = BusError;

  async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
    let mut topics = self.topics.lock().expect("bus lock");
    let state = topics.entry(topic.to_string()).or_default();
    match &state.sender {
      Some(sender) => sender
        .send(payload.to_vec())
        .map_err(|_| BusError::ConsumerGone(topic.to_string())),
      None => {
        state.pending.push(payload.to_vec());
        Ok(())
      }
    }
  }
}
