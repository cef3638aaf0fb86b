//! WebSocket transport for push channels.
//!
//! Implements the `StreamConnector` port with tokio-tungstenite. Pings
//! are answered by tungstenite; only text frames, closes and errors
//! reach the channel connection.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::domain::SyncError;
use crate::ports::{StreamConnector, StreamEvent, StreamSession};

/// Production connector backed by tokio-tungstenite.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl StreamConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamSession>, SyncError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Ok(Box::new(WsSession { stream }))
    }
}

/// One open WebSocket.
struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl StreamSession for WsSession {
    async fn next_event(&mut self) -> StreamEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return StreamEvent::Frame(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return StreamEvent::Frame(text),
                    Err(e) => debug!(error = %e, "Skipping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    return StreamEvent::Closed {
                        code: frame.map(|f| u16::from(f.code)),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return StreamEvent::Failed(e.to_string()),
                None => return StreamEvent::Closed { code: None },
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), SyncError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close handshake failed");
        }
    }
}
