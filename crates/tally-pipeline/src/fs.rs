//! [`LocalDirSource`] — a filesystem implementation of [`SourceStore`].
//!
//! Treats a directory tree as the external file store: `folder_id` is a
//! subdirectory relative to the root (empty string for the root itself),
//! file ids are root-relative paths, and creation time comes from file
//! metadata.

use std::{
  path::{Component, Path, PathBuf},
  time::SystemTime,
};

use chrono::{DateTime, Utc};
use tally_core::source::{SourceFile, SourceStore};

use crate::Error;

/// Media type guessed from the file extension; anything unknown is an
/// octet stream, which the extractor treats as unsupported.
fn mime_for(path: &Path) -> &'static str {
  match path.extension().and_then(|e| e.to_str()) {
    Some("pdf") => "application/pdf",
    Some("png") => "image/png",
    Some("jpg") | Some("jpeg") => "image/jpeg",
    Some("gif") => "image/gif",
    Some("webp") => "image/webp",
    Some("txt") => "text/plain",
    _ => "application/octet-stream",
  }
}

#[derive(Clone)]
pub struct LocalDirSource {
  root: PathBuf,
}

impl LocalDirSource {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Reject ids that would escape the root.
  fn resolve(&self, file_id: &str) -> Result<PathBuf, Error> {
    let rel = Path::new(file_id);
    let escapes = rel.is_absolute()
      || rel
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
      return Err(Error::InvalidFileId(file_id.to_string()));
    }
    Ok(self.root.join(rel))
  }
}

fn created_time(meta: &std::fs::Metadata) -> Option<DateTime<Utc>> {
  // Not every filesystem records a birth time; fall back to mtime.
  meta
    .created()
    .or_else(|_| meta.modified())
    .ok()
    .map(|st: SystemTime| st.into())
}

impl SourceStore for LocalDirSource {
  type Error = Error;

  async fn list_created_since(
    &self,
    folder_id: &str,
    since: DateTime<Utc>,
  ) -> Result<Vec<SourceFile>, Error> {
    let dir = self.resolve(folder_id)?;
    let mut files = Vec::new();

    let mut entries = match tokio::fs::read_dir(&dir).await {
      Ok(entries) => entries,
      // A missing folder is an empty scan, not a failure — the folder may
      // simply not have received its first file yet.
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
      Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
      let meta = entry.metadata().await?;
      if !meta.is_file() {
        continue;
      }
      let Some(created) = created_time(&meta) else { continue };
      if created < since {
        continue;
      }

      let name = entry.file_name().to_string_lossy().into_owned();
      let file_id = if folder_id.is_empty() {
        name.clone()
      } else {
        format!("{}/{}", folder_id.trim_end_matches('/'), name)
      };

      files.push(SourceFile {
        mime_type: mime_for(Path::new(&name)).to_string(),
        file_id,
        name,
        created_time: created,
        folder_id: folder_id.to_string(),
      });
    }

    files.sort_by_key(|f| f.created_time);
    Ok(files)
  }

  async fn fetch_bytes(&self, file_id: &str) -> Result<Vec<u8>, Error> {
    let path = self.resolve(file_id)?;
    Ok(tokio::fs::read(path).await?)
  }
}
