//! Source Watcher — overlap-polling of the external store.
//!
//! Each scan covers `[now − lookback, now]` with lookback strictly larger
//! than the invocation period, so consecutive scans overlap and a file
//! cannot slip between them on clock or propagation skew. The seen cache
//! only suppresses duplicate forwards across those overlapping scans; the
//! dedupe boundary that actually guarantees correctness is the validator's
//! marker store plus the writer's content-hash check.

use std::{
  collections::{HashSet, VecDeque},
  future::Future,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{
  retry::RetryPolicy,
  source::{SourceFile, SourceStore},
};

use crate::{Error, Result};

// ─── Seen cache ──────────────────────────────────────────────────────────────

/// Bounded FIFO of recently forwarded file ids — oldest evicted first. A
/// plain optimization, not a correctness boundary.
#[derive(Debug)]
pub struct SeenCache {
  capacity: usize,
  order:    VecDeque<String>,
  set:      HashSet<String>,
}

impl SeenCache {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      order:    VecDeque::new(),
      set:      HashSet::new(),
    }
  }

  /// Rebuild from persisted entries, oldest first. Entries beyond capacity
  /// are dropped from the old end.
  pub fn from_entries(capacity: usize, entries: Vec<String>) -> Self {
    let mut cache = Self::new(capacity);
    for id in entries {
      cache.insert(id);
    }
    cache
  }

  pub fn contains(&self, file_id: &str) -> bool {
    self.set.contains(file_id)
  }

  pub fn insert(&mut self, file_id: String) {
    if !self.set.insert(file_id.clone()) {
      return;
    }
    self.order.push_back(file_id);
    while self.order.len() > self.capacity {
      if let Some(evicted) = self.order.pop_front() {
        self.set.remove(&evicted);
      }
    }
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  /// Entries oldest-first, for persistence.
  pub fn entries(&self) -> Vec<String> {
    self.order.iter().cloned().collect()
  }
}

// ─── Persisted state ─────────────────────────────────────────────────────────

/// What survives between watcher invocations: the seen cache and a
/// watermark of the newest creation time observed. The watermark is
/// diagnostic only — the scan window never depends on it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatcherState {
  #[serde(default)]
  pub seen:      Vec<String>,
  #[serde(default)]
  pub watermark: Option<DateTime<Utc>>,
}

impl WatcherState {
  /// Load from `path`; a missing or unreadable file starts fresh. The
  /// downstream dedupe layers make a lost cache safe, just noisier.
  pub async fn load(path: &Path) -> Self {
    match tokio::fs::read(path).await {
      Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|error| {
        tracing::warn!(%error, ?path, "corrupt watcher state; starting fresh");
        Self::default()
      }),
      Err(_) => Self::default(),
    }
  }

  pub async fn save(&self, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, serde_json::to_vec(self)?).await?;
    Ok(())
  }
}

// ─── Forwarder ───────────────────────────────────────────────────────────────

/// Hand-off of one candidate descriptor to the intake gate. Returning `Ok`
/// means the gate confirmed admission; only then may the watcher cache the
/// file id.
pub trait Forwarder: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn forward<'a>(
    &'a self,
    file: &'a SourceFile,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// HTTP forwarder posting to the intake gate with the shared retry policy.
pub struct HttpForwarder {
  client:   reqwest::Client,
  endpoint: String,
  api_key:  String,
  policy:   RetryPolicy,
}

impl HttpForwarder {
  pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, policy: RetryPolicy) -> Self {
    Self {
      client: reqwest::Client::new(),
      endpoint: endpoint.into(),
      api_key: api_key.into(),
      policy,
    }
  }
}

impl Forwarder for HttpForwarder {
  type Error = reqwest::Error;

  async fn forward(&self, file: &SourceFile) -> Result<(), reqwest::Error> {
    self
      .policy
      .run(|| async {
        self
          .client
          .post(&self.endpoint)
          .header("X-API-Key", &self.api_key)
          .json(file)
          .send()
          .await?
          .error_for_status()?;
        Ok(())
      })
      .await
  }
}

// ─── Watcher ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
  pub folder_id:        String,
  pub state_path:       PathBuf,
  /// Must be strictly larger than the invocation period.
  pub lookback_minutes: i64,
  pub cache_capacity:   usize,
}

/// Result of one scan pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
  pub listed:    usize,
  pub forwarded: usize,
  pub failed:    usize,
  pub skipped:   usize,
}

pub struct SourceWatcher<S: SourceStore, F: Forwarder> {
  source:    S,
  forwarder: F,
  config:    WatcherConfig,
  cache:     SeenCache,
  watermark: Option<DateTime<Utc>>,
}

impl<S: SourceStore, F: Forwarder> SourceWatcher<S, F> {
  /// Build a watcher, restoring cache and watermark from the state file.
  pub async fn load(source: S, forwarder: F, config: WatcherConfig) -> Self {
    let state = WatcherState::load(&config.state_path).await;
    let cache = SeenCache::from_entries(config.cache_capacity, state.seen);
    Self { source, forwarder, config, cache, watermark: state.watermark }
  }

  /// One scan pass: list the overlap window, forward unseen files, persist
  /// state. A file whose forward fails is left out of the cache so the next
  /// overlapping scan retries it — at-least-once forwarding by design of
  /// the window, not at-most-once.
  pub async fn scan(&mut self, now: DateTime<Utc>) -> Result<ScanReport> {
    let since = now - Duration::minutes(self.config.lookback_minutes);
    let files = self
      .source
      .list_created_since(&self.config.folder_id, since)
      .await
      .map_err(Error::source_store)?;

    let mut report = ScanReport { listed: files.len(), ..ScanReport::default() };

    for file in &files {
      if self.cache.contains(&file.file_id) {
        report.skipped += 1;
        continue;
      }
      match self.forwarder.forward(file).await {
        Ok(()) => {
          self.cache.insert(file.file_id.clone());
          report.forwarded += 1;
        }
        Err(error) => {
          tracing::warn!(%error, file_id = %file.file_id, "forward failed; will retry next scan");
          report.failed += 1;
        }
      }
    }

    if let Some(newest) = files.iter().map(|f| f.created_time).max() {
      self.watermark = Some(self.watermark.map_or(newest, |w| w.max(newest)));
    }
    self.persist().await?;

    tracing::info!(
      folder = %self.config.folder_id,
      listed = report.listed,
      forwarded = report.forwarded,
      failed = report.failed,
      skipped = report.skipped,
      "scan complete"
    );
    Ok(report)
  }

  async fn persist(&self) -> Result<()> {
    let state = WatcherState { seen: self.cache.entries(), watermark: self.watermark };
    state.save(&self.config.state_path).await
  }

  pub fn cache(&self) -> &SeenCache {
    &self.cache
  }

  pub fn watermark(&self) -> Option<DateTime<Utc>> {
    self.watermark
  }
}
