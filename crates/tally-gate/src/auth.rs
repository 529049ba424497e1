//! Shared-secret header authentication for the intake gate.

use axum::http::HeaderMap;

use crate::error::Error;

/// Header carrying the shared static key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Verify the shared secret. Absent or mismatched key is an authentication
/// failure for this request only — never retried.
pub fn verify_api_key(headers: &HeaderMap, expected: &str) -> Result<(), Error> {
  let provided = headers
    .get(API_KEY_HEADER)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .ok_or(Error::Unauthorized)?;

  if !constant_time_eq(provided.as_bytes(), expected.trim().as_bytes()) {
    return Err(Error::Unauthorized);
  }
  Ok(())
}

/// Compare without an early exit on the first differing byte, so response
/// timing does not leak a prefix of the key.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
  if a.len() != b.len() {
    return false;
  }
  a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
