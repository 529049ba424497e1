//! Tally server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the
//! SQLite store, and runs the whole pipeline in one process: the HTTP
//! intake gate, the bus consumers for every stage, and the source-watcher
//! poll loop. The watcher forwards through the gate's own HTTP endpoint,
//! the same path any external scanner would take.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use tally_core::{bus::Topics, retry::RetryPolicy};
use tally_gate::{AppState, GateConfig};
use tally_pipeline::{
  bus::MemoryBus,
  extract::{ContentExtractor, DisabledOcr, ExtractorConfig, Utf8TextLayer},
  fs::LocalDirSource,
  run::spawn_stages,
  structuring::{HttpStructurer, StructurerBackend, StructuringStage},
  validate::{Validator, ValidatorConfig},
  watcher::{HttpForwarder, SourceWatcher, WatcherConfig},
  writer::LedgerWriter,
};
use tally_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Tally receipt-pipeline server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

/// Full runtime configuration. Every knob is externally supplied; nothing
/// is read ad hoc from process-wide state.
#[derive(Deserialize, Clone)]
#[serde(default)]
struct AppConfig {
  gate:                    GateConfig,
  store_path:              PathBuf,
  source_root:             PathBuf,
  folder_id:               String,
  state_path:              PathBuf,
  poll_minutes:            u64,
  lookback_minutes:        i64,
  cache_capacity:          usize,
  extractor:               ExtractorConfig,
  validator:               ValidatorConfig,
  structurer_endpoint:     Option<String>,
  structurer_timeout_secs: u64,
  topics:                  Topics,
  retry:                   RetryPolicy,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      gate:                    GateConfig {
        host:    "127.0.0.1".to_string(),
        port:    8080,
        api_key: String::new(),
      },
      store_path:              PathBuf::from("tally.db"),
      source_root:             PathBuf::from("receipts"),
      folder_id:               "inbox".to_string(),
      state_path:              PathBuf::from("watcher-state.json"),
      poll_minutes:            1,
      lookback_minutes:        5,
      cache_capacity:          500,
      extractor:               ExtractorConfig::default(),
      validator:               ValidatorConfig::default(),
      structurer_endpoint:     None,
      structurer_timeout_secs: 30,
      topics:                  Topics::default(),
      retry:                   RetryPolicy::default(),
    }
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TALLY").separator("__"))
    .build()
    .context("failed to read config file")?;
  let app: AppConfig = settings
    .try_deserialize()
    .context("failed to deserialise AppConfig")?;

  anyhow::ensure!(!app.gate.api_key.trim().is_empty(), "gate.api_key must be set");
  anyhow::ensure!(
    app.lookback_minutes > app.poll_minutes as i64,
    "lookback_minutes must exceed poll_minutes so consecutive scans overlap"
  );

  // Open the store shared by the validator's markers and the ledgers.
  let store = SqliteStore::open(&app.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", app.store_path))?;

  let bus = MemoryBus::new();
  let topics = app.topics.clone();
  let source = LocalDirSource::new(&app.source_root);

  // Wire the stages to their topics.
  let extractor = ContentExtractor::new(
    source.clone(),
    Utf8TextLayer,
    DisabledOcr,
    bus.clone(),
    topics.clone(),
    app.extractor,
  );
  let structurer = match &app.structurer_endpoint {
    Some(endpoint) => StructurerBackend::Http(HttpStructurer::new(
      endpoint.as_str(),
      Duration::from_secs(app.structurer_timeout_secs),
    )?),
    None => {
      tracing::warn!("no structurer endpoint configured; all receipts will route to review");
      StructurerBackend::Disabled
    }
  };
  let structuring = StructuringStage::new(structurer, bus.clone(), topics.clone());
  let validator = Validator::new(store.clone(), bus.clone(), topics.clone(), app.validator.clone());
  let writer = LedgerWriter::new(store.clone());
  spawn_stages(&bus, &topics, app.retry, extractor, structuring, validator, writer);

  // Source watcher poll loop.
  let endpoint = format!("http://{}:{}/ingest", app.gate.host, app.gate.port);
  let forwarder = HttpForwarder::new(endpoint, app.gate.api_key.clone(), app.retry);
  let watcher_config = WatcherConfig {
    folder_id:        app.folder_id.clone(),
    state_path:       app.state_path.clone(),
    lookback_minutes: app.lookback_minutes,
    cache_capacity:   app.cache_capacity,
  };
  let mut watcher = SourceWatcher::load(source, forwarder, watcher_config).await;
  let poll = Duration::from_secs(app.poll_minutes.max(1) * 60);
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(poll);
    loop {
      ticker.tick().await;
      if let Err(error) = watcher.scan(Utc::now()).await {
        tracing::error!(%error, "source scan failed");
      }
    }
  });

  // Serve the gate.
  let state = AppState {
    bus:    Arc::new(bus),
    ledger: Arc::new(store),
    topics: Arc::new(topics),
    config: Arc::new(app.gate.clone()),
  };
  let router = tally_gate::router(state);
  let address = format!("{}:{}", app.gate.host, app.gate.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  axum::serve(listener, router).await.context("server error")?;

  Ok(())
}
