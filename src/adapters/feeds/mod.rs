//! Push Channel Adapters - Supervised Real-time Feeds
//!
//! - `connection`: one supervised channel with fixed-interval reconnect
//! - `multiplexer`: dynamic set of connections keyed by identity
//! - `ws`: tokio-tungstenite transport

pub mod connection;
pub mod multiplexer;
pub mod ws;

pub use connection::{ChannelHandle, StreamClient, FORBIDDEN_CLOSE_CODE};
pub use multiplexer::{ChannelMultiplexer, MessageSink, SetDiff};
pub use ws::WsConnector;
