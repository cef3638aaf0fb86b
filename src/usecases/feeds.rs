//! Standard dashboard feeds.
//!
//! Channel names and `type` discriminants are the backend's contract and
//! are consumed verbatim.

use serde_json::Value;

use super::reconciler::{FeedSpec, SnapshotRequest};
use crate::adapters::api::CallOptions;
use crate::domain::{ChannelIdentity, PayloadShape};

/// Signal stream channel.
pub const SIGNALS_CHANNEL: &str = "signals";
/// Log stream channel.
pub const LOGS_CHANNEL: &str = "logs";
/// Decision list channel.
pub const DECISIONS_CHANNEL: &str = "decisions";
/// Arbitrage opportunity list channel.
pub const OPPORTUNITIES_CHANNEL: &str = "opportunities";
/// Prefix of the per-exchange ticker channels.
pub const TICKERS_PREFIX: &str = "tickers";

/// Ring buffer of trading signals, newest first.
pub fn signals(capacity: usize) -> FeedSpec {
    FeedSpec::ring(
        SIGNALS_CHANNEL,
        ChannelIdentity::new(SIGNALS_CHANNEL),
        "signal",
        capacity,
    )
    .with_snapshot(SnapshotRequest::new(format!("/signals?limit={capacity}")))
}

/// Ring buffer of engine log lines, newest first.
pub fn logs(capacity: usize) -> FeedSpec {
    FeedSpec::ring(LOGS_CHANNEL, ChannelIdentity::new(LOGS_CHANNEL), "log", capacity)
        .with_snapshot(SnapshotRequest::new(format!("/logs?limit={capacity}")))
}

/// Latest decision list; the server applies limit/filter itself.
pub fn decisions() -> FeedSpec {
    FeedSpec::replace(
        DECISIONS_CHANNEL,
        ChannelIdentity::new(DECISIONS_CHANNEL),
        "decisions",
        PayloadShape::Array,
    )
    .with_snapshot(SnapshotRequest::new("/decisions"))
}

/// Latest opportunity list. The snapshot runs a full scan, so it gets
/// the slow-endpoint deadline.
pub fn opportunities() -> FeedSpec {
    FeedSpec::replace(
        OPPORTUNITIES_CHANNEL,
        ChannelIdentity::new(OPPORTUNITIES_CHANNEL),
        "opportunities",
        PayloadShape::Array,
    )
    .with_snapshot(SnapshotRequest::new("/opportunities").with_options(CallOptions::slow()))
}

/// Ticker channel for one exchange.
pub fn ticker_channel(exchange: &str) -> ChannelIdentity {
    ChannelIdentity::new(format!("{TICKERS_PREFIX}/{exchange}"))
}

/// Keyed ticker view, one key per exchange. Push-only.
pub fn tickers<S: AsRef<str>>(exchanges: &[S]) -> FeedSpec {
    FeedSpec::keyed(
        TICKERS_PREFIX,
        exchanges.iter().map(|e| ticker_channel(e.as_ref())).collect(),
        "ticker",
        PayloadShape::Object,
    )
}

/// Ticker identities for a connected-exchanges response.
///
/// Accepts a list of ids, a list of objects with `id`/`exchange`/`name`,
/// or either wrapped in an `exchanges` member.
pub fn exchange_channels(response: &Value) -> Vec<ChannelIdentity> {
    let list = match response {
        Value::Object(map) => map.get("exchanges").and_then(Value::as_array),
        Value::Array(items) => Some(items),
        _ => None,
    };

    let mut channels: Vec<ChannelIdentity> = list
        .into_iter()
        .flatten()
        .filter_map(|item| match item {
            Value::String(id) => Some(id.as_str()),
            Value::Object(map) => ["id", "exchange", "name"]
                .iter()
                .find_map(|field| map.get(*field).and_then(Value::as_str)),
            _ => None,
        })
        .filter(|id| !id.is_empty())
        .map(ticker_channel)
        .collect();
    channels.sort();
    channels.dedup();
    channels
}
