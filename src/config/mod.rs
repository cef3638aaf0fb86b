//! Configuration Module - TOML-based Sync Configuration
//!
//! Loads and validates configuration from `config.toml`. Endpoints,
//! deadlines, the reconnect interval and feed capacities are all
//! externalized here.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Process identity and logging.
  #[serde(default)]
  pub app: AppSection,
  /// Request gateway.
  pub api: ApiConfig,
  /// Push channels.
  pub stream: StreamConfig,
  /// Feed sizing and refresh.
  #[serde(default)]
  pub feeds: FeedsConfig,
  /// Metrics and health server.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Process identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
  /// Human-readable instance name.
  #[serde(default = "default_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

impl Default for AppSection {
  fn default() -> Self {
    Self {
      name: default_name(),
      log_level: default_log_level(),
    }
  }
}

/// Request gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// REST base URL, e.g. `https://dash.example.com/api`.
  pub base_url: String,
  /// Default request deadline (milliseconds).
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Deadline for known-slow endpoints (milliseconds).
  #[serde(default = "default_slow_timeout_ms")]
  pub slow_timeout_ms: u64,
}

impl ApiConfig {
  /// Default deadline.
  pub const fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  /// Slow-endpoint deadline.
  pub const fn slow_timeout(&self) -> Duration {
    Duration::from_millis(self.slow_timeout_ms)
  }
}

/// Push channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
  /// WebSocket base URL, e.g. `wss://dash.example.com/ws`.
  pub base_url: String,
  /// Fixed delay before reconnecting a dropped channel (milliseconds).
  #[serde(default = "default_reconnect_ms")]
  pub reconnect_interval_ms: u64,
}

impl StreamConfig {
  /// Reconnect interval.
  pub const fn reconnect_interval(&self) -> Duration {
    Duration::from_millis(self.reconnect_interval_ms)
  }
}

/// Feed sizing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
  /// Ring capacity of the signals feed.
  #[serde(default = "default_signals_capacity")]
  pub signals_capacity: usize,
  /// Ring capacity of the logs feed.
  #[serde(default = "default_logs_capacity")]
  pub logs_capacity: usize,
  /// Endpoint listing connected exchanges.
  #[serde(default = "default_exchanges_path")]
  pub exchanges_path: String,
  /// How often the ticker channel set is refreshed (seconds).
  #[serde(default = "default_exchange_refresh")]
  pub exchange_refresh_secs: u64,
}

impl Default for FeedsConfig {
  fn default() -> Self {
    Self {
      signals_capacity: default_signals_capacity(),
      logs_capacity: default_logs_capacity(),
      exchanges_path: default_exchanges_path(),
      exchange_refresh_secs: default_exchange_refresh(),
    }
  }
}

/// Metrics and health configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Serve /live, /ready and /metrics.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Bind address of the health server.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
    }
  }
}

// Default value functions for serde

fn default_name() -> String {
  "live-feed-sync".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

const fn default_timeout_ms() -> u64 {
  15_000
}

const fn default_slow_timeout_ms() -> u64 {
  60_000
}

const fn default_reconnect_ms() -> u64 {
  3_000
}

const fn default_signals_capacity() -> usize {
  50
}

const fn default_logs_capacity() -> usize {
  100
}

fn default_exchanges_path() -> String {
  "/exchanges/connected".to_string()
}

const fn default_exchange_refresh() -> u64 {
  30
}

const fn default_true() -> bool {
  true
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}
