//! Stage handlers for the Tally receipt pipeline.
//!
//! Each stage is an independent async handler consuming one bus topic and
//! emitting at most one downstream event per input. Delivery between stages
//! is at-least-once; every handler's effect is idempotent past its first
//! success.

pub mod bus;
pub mod error;
pub mod extract;
pub mod fs;
pub mod run;
pub mod structuring;
pub mod validate;
pub mod watcher;
pub mod writer;

pub use error::{Error, Result};
