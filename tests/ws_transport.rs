//! WebSocket Transport Tests - Real Sockets via tokio-tungstenite
//!
//! A local tungstenite server drives the production connector through
//! a full lifecycle: handshake with token, echo, ordinary close,
//! reconnect, forbidden close.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use live_feed_sync::adapters::feeds::{StreamClient, FORBIDDEN_CLOSE_CODE};
use live_feed_sync::domain::{ChannelIdentity, ConnectionState, SessionStore, TerminalReason};

async fn close_with(ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>, code: u16) {
    ws.close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: "bye".into(),
    }))
    .await
    .unwrap();
    while let Some(Ok(_)) = ws.next().await {}
}

#[tokio::test]
async fn test_websocket_lifecycle_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uri_tx, mut uri_rx) = mpsc::unbounded_channel::<String>();

    let server = tokio::spawn(async move {
        for round in 0..2 {
            let (tcp, _) = listener.accept().await.unwrap();
            let uri_tx = uri_tx.clone();
            let mut ws = accept_hdr_async(tcp, move |req: &Request, resp: Response| {
                let _ = uri_tx.send(req.uri().to_string());
                Ok::<_, ErrorResponse>(resp)
            })
            .await
            .unwrap();

            if round == 0 {
                // Echo the client's first message, then drop it politely.
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        ws.send(Message::Text(text)).await.unwrap();
                        break;
                    }
                }
                close_with(&mut ws, 1000).await;
            } else {
                ws.send(Message::Text(json!({"type": "signal", "data": {"seq": 2}}).to_string()))
                    .await
                    .unwrap();
                close_with(&mut ws, FORBIDDEN_CLOSE_CODE).await;
            }
        }
    });

    let client = StreamClient::websocket(&format!("ws://{addr}/ws"), SessionStore::with_token("abc"))
        .unwrap()
        .with_reconnect_interval(Duration::from_millis(50));
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let handle = client.subscribe(ChannelIdentity::new("signals"), move |value| {
        let _ = tx.send(value);
    });
    let mut state = handle.watch_state();

    state.wait_for(|s| *s == ConnectionState::Open).await.unwrap();
    assert_eq!(uri_rx.recv().await.unwrap(), "/ws/signals?token=abc");

    let ping = json!({"type": "ping", "data": {"seq": 1}});
    assert!(handle.send(&ping));
    assert_eq!(rx.recv().await.unwrap(), ping);

    assert_eq!(
        rx.recv().await.unwrap(),
        json!({"type": "signal", "data": {"seq": 2}})
    );
    assert_eq!(uri_rx.recv().await.unwrap(), "/ws/signals?token=abc");

    let end = tokio::time::timeout(Duration::from_secs(5), state.wait_for(ConnectionState::is_terminal))
        .await
        .unwrap()
        .map(|s| *s)
        .unwrap();
    assert_eq!(end, ConnectionState::ClosedTerminal(TerminalReason::Forbidden));
    assert_eq!(handle.connect_attempts(), 2);

    server.await.unwrap();
}

#[tokio::test]
async fn test_unreachable_server_stays_retryable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = StreamClient::websocket(&format!("ws://{addr}/ws"), SessionStore::new())
        .unwrap()
        .with_reconnect_interval(Duration::from_millis(20));
    let handle = client.subscribe(ChannelIdentity::new("logs"), |_| {});
    let mut state = handle.watch_state();

    state
        .wait_for(|s| *s == ConnectionState::ClosedRetryable)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(handle.connect_attempts() >= 2);
    assert!(!handle.state().is_terminal());

    assert_eq!(
        handle.closed().await,
        ConnectionState::ClosedTerminal(TerminalReason::Unsubscribed)
    );
}
