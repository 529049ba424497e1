//! Error type for `tally-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tally_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date parse error: {0:?}")]
  DateParse(String),

  #[error("unknown row status: {0:?}")]
  BadStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
