//! Gateway Request/Response Types
//!
//! Per-call options and the error body shape returned by the backend
//! on non-success responses.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

/// Per-call overrides for a gateway request.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
  /// Alternate base route replacing the configured base URL.
  pub base: Option<String>,
  /// Deadline for this call; the gateway default applies when absent.
  pub timeout: Option<Duration>,
  /// Raw header overrides applied after the bearer header.
  pub headers: Vec<(String, String)>,
  /// Use the configured slow-endpoint deadline.
  pub slow: bool,
}

impl CallOptions {
  /// Options for a known-slow endpoint (60 s by default).
  pub fn slow() -> Self {
    Self {
      slow: true,
      ..Self::default()
    }
  }

  /// Override the deadline.
  #[must_use]
  pub const fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  /// Route this call to a different base.
  #[must_use]
  pub fn with_base(mut self, base: impl Into<String>) -> Self {
    self.base = Some(base.into());
    self
  }

  /// Add a raw header.
  #[must_use]
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }
}

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
  /// Human-readable detail: a string, or a list of validation entries.
  #[serde(default)]
  pub detail: Option<Value>,
}

impl ErrorBody {
  /// Extract a display message from `detail`, if it carries one.
  pub fn message(&self) -> Option<String> {
    match self.detail.as_ref()? {
      Value::String(text) if !text.is_empty() => Some(text.clone()),
      Value::Array(entries) => {
        let parts: Vec<&str> = entries
          .iter()
          .filter_map(|entry| entry.get("msg").and_then(Value::as_str))
          .collect();
        if parts.is_empty() {
          None
        } else {
          Some(parts.join("; "))
        }
      }
      _ => None,
    }
  }
}

/// Message for a non-success response.
///
/// Prefers the structured `detail`; falls back to the status code when
/// the body is empty or not an error body.
pub fn error_message(status: u16, body: &[u8]) -> String {
  serde_json::from_slice::<ErrorBody>(body)
    .ok()
    .and_then(|b| b.message())
    .unwrap_or_else(|| format!("Request failed with status {status}"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_error_message_prefers_detail() {
    let body = br#"{"detail": "Exchange not connected"}"#;
    assert_eq!(error_message(400, body), "Exchange not connected");
  }

  #[test]
  fn test_error_message_joins_validation_entries() {
    let body = br#"{"detail": [{"loc": ["query", "limit"], "msg": "too large"}, {"msg": "bad"}]}"#;
    assert_eq!(error_message(422, body), "too large; bad");
  }

  #[test]
  fn test_error_message_falls_back_to_status() {
    assert_eq!(error_message(500, b""), "Request failed with status 500");
    assert_eq!(error_message(502, b"<html>"), "Request failed with status 502");
    assert_eq!(error_message(404, br#"{"error": "x"}"#), "Request failed with status 404");
  }

  #[test]
  fn test_slow_options() {
    let opts = CallOptions::slow().with_header("X-Trace", "1");
    assert!(opts.slow);
    assert!(opts.timeout.is_none());
    assert_eq!(opts.headers.len(), 1);
  }
}
