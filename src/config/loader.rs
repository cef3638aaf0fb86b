//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    api = %config.api.base_url,
    stream = %config.stream.base_url,
    reconnect_ms = config.stream.reconnect_interval_ms,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    config.api.base_url.starts_with("http://") || config.api.base_url.starts_with("https://"),
    "api.base_url must be an http(s) URL, got {}",
    config.api.base_url
  );
  anyhow::ensure!(
    config.stream.base_url.starts_with("ws://") || config.stream.base_url.starts_with("wss://"),
    "stream.base_url must be a ws(s) URL, got {}",
    config.stream.base_url
  );

  anyhow::ensure!(config.api.timeout_ms > 0, "api.timeout_ms must be positive");
  anyhow::ensure!(
    config.api.slow_timeout_ms >= config.api.timeout_ms,
    "api.slow_timeout_ms ({}) must be >= api.timeout_ms ({})",
    config.api.slow_timeout_ms,
    config.api.timeout_ms
  );
  anyhow::ensure!(
    config.stream.reconnect_interval_ms > 0,
    "stream.reconnect_interval_ms must be positive"
  );

  anyhow::ensure!(
    config.feeds.signals_capacity > 0 && config.feeds.logs_capacity > 0,
    "feed capacities must be positive"
  );
  anyhow::ensure!(
    config.feeds.exchanges_path.starts_with('/'),
    "feeds.exchanges_path must start with '/'"
  );
  anyhow::ensure!(
    config.feeds.exchange_refresh_secs > 0,
    "feeds.exchange_refresh_secs must be positive"
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  const MINIMAL: &str = r#"
[api]
base_url = "http://127.0.0.1:8000/api"

[stream]
base_url = "ws://127.0.0.1:8000/ws"
"#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = parse_config(MINIMAL).unwrap();
    assert_eq!(config.api.timeout_ms, 15_000);
    assert_eq!(config.api.slow_timeout_ms, 60_000);
    assert_eq!(config.stream.reconnect_interval_ms, 3_000);
    assert_eq!(config.feeds.signals_capacity, 50);
    assert_eq!(config.feeds.logs_capacity, 100);
    assert_eq!(config.app.log_level, "info");
    assert!(config.metrics.enabled);
  }

  #[test]
  fn test_rejects_non_websocket_stream_base() {
    let bad = MINIMAL.replace("ws://127.0.0.1:8000/ws", "http://127.0.0.1:8000/ws");
    let err = parse_config(&bad).unwrap_err();
    assert!(err.to_string().contains("stream.base_url"));
  }

  #[test]
  fn test_rejects_slow_timeout_below_default() {
    let bad = format!("{MINIMAL}\n");
    let bad = bad.replace(
      "base_url = \"http://127.0.0.1:8000/api\"",
      "base_url = \"http://127.0.0.1:8000/api\"\ntimeout_ms = 5000\nslow_timeout_ms = 1000",
    );
    assert!(parse_config(&bad).is_err());
  }
}
