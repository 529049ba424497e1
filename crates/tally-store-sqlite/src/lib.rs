//! SQLite backend for the Tally dedupe markers and monthly ledgers.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. SQLite serializes writes,
//! which is what makes the first-writer-wins marker insert atomic per key.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
