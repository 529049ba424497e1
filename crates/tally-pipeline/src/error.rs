//! Error type for `tally-pipeline`.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("source store error: {0}")]
  Source(#[source] BoxError),

  #[error("bus error: {0}")]
  Bus(#[source] BoxError),

  #[error("marker store error: {0}")]
  Marker(#[source] BoxError),

  #[error("ledger store error: {0}")]
  Ledger(#[source] BoxError),

  #[error("invalid file id: {0:?}")]
  InvalidFileId(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
}

impl Error {
  pub fn source_store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Source(Box::new(e))
  }

  pub fn bus(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Bus(Box::new(e))
  }

  pub fn marker(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Marker(Box::new(e))
  }

  pub fn ledger(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Ledger(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
