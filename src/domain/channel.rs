//! Channel identity and connection lifecycle types.

use std::collections::BTreeMap;
use std::fmt;

/// Parameter name that overrides the keyed-map key of an identity.
pub const KEY_PARAM: &str = "key";

/// A named, parameterized push channel.
///
/// Equality and hashing are by value. Parameters live in a `BTreeMap`,
/// so two identities built with the same pairs in a different order are
/// the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelIdentity {
    name: String,
    params: BTreeMap<String, String>,
}

impl ChannelIdentity {
    /// Identity with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add (or replace) a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Channel name, e.g. `signals` or `tickers/binance`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized parameter set.
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Key used by keyed-map views.
    ///
    /// The `key` parameter wins when present; otherwise the last path
    /// segment of the name (`tickers/okx` → `okx`).
    pub fn key(&self) -> String {
        if let Some(key) = self.params.get(KEY_PARAM) {
            return key.clone();
        }
        self.name
            .rsplit('/')
            .next()
            .unwrap_or(&self.name)
            .to_string()
    }
}

impl fmt::Display for ChannelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{k}={v}")?;
        }
        Ok(())
    }
}

/// Why a connection stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// Server closed with the reserved forbidden code.
    Forbidden,
    /// Caller closed or dropped the handle.
    Unsubscribed,
    /// The session was cleared (logout or auth expiry).
    SessionEnded,
}

/// Lifecycle of one channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in flight.
    Connecting,
    /// Receiving frames.
    Open,
    /// Disconnected; exactly one reconnect is scheduled.
    ClosedRetryable,
    /// Disconnected for good; resources released.
    ClosedTerminal(TerminalReason),
}

impl ConnectionState {
    /// Whether no further reconnects will happen.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::ClosedTerminal(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::ClosedRetryable => write!(f, "closed-retryable"),
            Self::ClosedTerminal(reason) => write!(f, "closed-terminal({reason:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality_ignores_param_order() {
        let a = ChannelIdentity::new("tickers/binance")
            .with_param("depth", "5")
            .with_param("quote", "usdt");
        let b = ChannelIdentity::new("tickers/binance")
            .with_param("quote", "usdt")
            .with_param("depth", "5");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "tickers/binance?depth=5&quote=usdt");
    }

    #[test]
    fn test_identity_key_from_name_or_param() {
        assert_eq!(ChannelIdentity::new("tickers/okx").key(), "okx");
        assert_eq!(ChannelIdentity::new("signals").key(), "signals");
        let keyed = ChannelIdentity::new("tickers").with_param(KEY_PARAM, "kraken");
        assert_eq!(keyed.key(), "kraken");
    }

    #[test]
    fn test_terminal_state() {
        assert!(ConnectionState::ClosedTerminal(TerminalReason::Forbidden).is_terminal());
        assert!(!ConnectionState::ClosedRetryable.is_terminal());
    }
}
