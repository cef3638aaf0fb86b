//! Stream Transport Port - Push Channel Socket Interface
//!
//! Channel connections talk to the backend through these traits so the
//! supervision logic never depends on a concrete WebSocket library.
//! The production adapter lives in `adapters::feeds::ws`.

use async_trait::async_trait;

use crate::domain::SyncError;

/// One inbound event from an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
  /// A text frame (not yet parsed).
  Frame(String),
  /// The peer closed the socket, with its close code if any.
  Closed {
    /// Close code from the close frame.
    code: Option<u16>,
  },
  /// Transport failure while reading.
  Failed(String),
}

/// An open socket.
#[async_trait]
pub trait StreamSession: Send {
  /// Wait for the next event.
  ///
  /// Must be cancel-safe: dropping the future loses no frame. After
  /// `Closed` or `Failed` the session is finished.
  async fn next_event(&mut self) -> StreamEvent;

  /// Send a text frame.
  async fn send_text(&mut self, text: String) -> Result<(), SyncError>;

  /// Close the socket from our side.
  async fn close(&mut self);
}

/// Opens sockets for channel URLs.
#[async_trait]
pub trait StreamConnector: Send + Sync + 'static {
  /// Perform the handshake for `url`.
  async fn connect(&self, url: &str) -> Result<Box<dyn StreamSession>, SyncError>;
}
