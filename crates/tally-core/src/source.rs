//! The external file store, specified only at its interface boundary.
//!
//! The watcher lists it and the extractor fetches from it; how files get
//! there (scanner app, sync folder, drive API) is not this system's
//! concern.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptor of one file in the external store. Field casing matches the
/// intake gate's wire payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
  pub file_id:      String,
  pub name:         String,
  pub mime_type:    String,
  pub created_time: DateTime<Utc>,
  pub folder_id:    String,
}

/// Abstraction over the external file store.
///
/// Listing must be tolerant of being called with overlapping windows — the
/// watcher deliberately re-scans a window wider than its invocation period.
pub trait SourceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// List files in `folder_id` created at or after `since`, oldest first.
  fn list_created_since<'a>(
    &'a self,
    folder_id: &'a str,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<SourceFile>, Self::Error>> + Send + 'a;

  /// Fetch the raw bytes of a file.
  fn fetch_bytes<'a>(
    &'a self,
    file_id: &'a str,
  ) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send + 'a;
}
