//! Prometheus Metrics Registry - Sync Observability
//!
//! Counts gateway outcomes, channel connect attempts, dropped frames
//! and view updates so a stale feed can be explained from Grafana.

use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tracing::warn;

/// Centralized Prometheus metrics for the sync layer.
///
/// All metrics follow the naming convention `feed_sync_*`.
pub struct SyncMetrics {
    /// Prometheus registry.
    registry: Registry,
    /// Gateway calls by outcome (`ok` or an error label).
    pub gateway_requests: IntCounterVec,
    /// Gateway round-trip latency in milliseconds.
    pub gateway_latency_ms: Histogram,
    /// Channel connect attempts by channel name.
    pub channel_connects: IntCounterVec,
    /// Channels currently open.
    pub channels_open: IntGauge,
    /// Push frames dropped before reaching a view, by reason.
    pub frames_dropped: IntCounterVec,
    /// Applied view changes by feed.
    pub view_updates: IntCounterVec,
}

impl SyncMetrics {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let gateway_requests = IntCounterVec::new(
            Opts::new("feed_sync_gateway_requests_total", "Gateway calls by outcome"),
            &["outcome"],
        )?;

        let gateway_latency_ms = Histogram::with_opts(
            HistogramOpts::new(
                "feed_sync_gateway_latency_ms",
                "Gateway round-trip latency in milliseconds",
            )
            .buckets(vec![5.0, 25.0, 100.0, 250.0, 1000.0, 5000.0, 15000.0, 60000.0]),
        )?;

        let channel_connects = IntCounterVec::new(
            Opts::new(
                "feed_sync_channel_connects_total",
                "Channel connect attempts",
            ),
            &["channel"],
        )?;

        let channels_open = IntGauge::new(
            "feed_sync_channels_open",
            "Channel connections currently open",
        )?;

        let frames_dropped = IntCounterVec::new(
            Opts::new(
                "feed_sync_frames_dropped_total",
                "Push frames dropped before reaching a view",
            ),
            &["reason"],
        )?;

        let view_updates = IntCounterVec::new(
            Opts::new("feed_sync_view_updates_total", "Applied view changes"),
            &["feed"],
        )?;

        registry.register(Box::new(gateway_requests.clone()))?;
        registry.register(Box::new(gateway_latency_ms.clone()))?;
        registry.register(Box::new(channel_connects.clone()))?;
        registry.register(Box::new(channels_open.clone()))?;
        registry.register(Box::new(frames_dropped.clone()))?;
        registry.register(Box::new(view_updates.clone()))?;

        Ok(Self {
            registry,
            gateway_requests,
            gateway_latency_ms,
            channel_connects,
            channels_open,
            frames_dropped,
            view_updates,
        })
    }

    /// Record one finished gateway call.
    pub fn observe_call(&self, outcome: &str, elapsed: Duration) {
        self.gateway_requests.with_label_values(&[outcome]).inc();
        self.gateway_latency_ms
            .observe(elapsed.as_secs_f64() * 1000.0);
    }

    /// Record a dropped push frame.
    pub fn frame_dropped(&self, reason: &str) {
        self.frames_dropped.with_label_values(&[reason]).inc();
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
