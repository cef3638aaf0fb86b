//! Multiplexer Tests - Set Diffing over a Scripted Transport

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use common::{fake_client, ServerSide, INTERVAL};
use live_feed_sync::adapters::feeds::{ChannelMultiplexer, MessageSink};
use live_feed_sync::domain::{ChannelIdentity, ConnectionState, SessionStore, TerminalReason};

fn ticker(exchange: &str) -> ChannelIdentity {
    ChannelIdentity::new(format!("tickers/{exchange}"))
}

type Inbox = Arc<Mutex<Vec<(String, Value)>>>;

fn recording_mux(client: live_feed_sync::adapters::feeds::StreamClient) -> (ChannelMultiplexer, Inbox) {
    let inbox: Inbox = Arc::default();
    let sink_inbox = Arc::clone(&inbox);
    let mux = ChannelMultiplexer::new(client, move |identity: &ChannelIdentity| -> MessageSink {
        let inbox = Arc::clone(&sink_inbox);
        let key = identity.key();
        Box::new(move |value| inbox.lock().unwrap().push((key.clone(), value)))
    });
    (mux, inbox)
}

#[tokio::test(start_paused = true)]
async fn test_update_opens_and_closes_by_diff() {
    let (client, _connector, mut server) = fake_client(SessionStore::with_token("abc"));
    let (mut mux, _inbox) = recording_mux(client);

    let diff = mux.update([ticker("okx"), ticker("binance")]);
    assert_eq!(diff.added, vec![ticker("binance"), ticker("okx")]);
    assert!(diff.removed.is_empty());

    let mut sockets: HashMap<String, ServerSide> = HashMap::new();
    for _ in 0..2 {
        let socket = server.accept().await;
        sockets.insert(socket.url.clone(), socket);
    }
    assert!(sockets.contains_key("wss://dash.test/ws/tickers/binance?token=abc"));
    assert!(sockets.contains_key("wss://dash.test/ws/tickers/okx?token=abc"));

    let mut binance = mux.watch_state(&ticker("binance")).unwrap();
    let diff = mux.update([ticker("okx"), ticker("kraken")]);
    assert_eq!(diff.added, vec![ticker("kraken")]);
    assert_eq!(diff.removed, vec![ticker("binance")]);

    binance.wait_for(ConnectionState::is_terminal).await.unwrap();
    assert_eq!(
        *binance.borrow(),
        ConnectionState::ClosedTerminal(TerminalReason::Unsubscribed)
    );

    let kraken = server.accept().await;
    assert_eq!(kraken.url, "wss://dash.test/ws/tickers/kraken?token=abc");
    assert!(server.try_accept(INTERVAL * 3).await.is_none(), "okx must not be reopened");
    assert_eq!(mux.identities(), vec![ticker("kraken"), ticker("okx")]);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_set_is_a_no_op() {
    let (client, _connector, mut server) = fake_client(SessionStore::with_token("abc"));
    let (mut mux, _inbox) = recording_mux(client);

    mux.update([ticker("okx")]);
    let _okx = server.accept().await;

    let diff = mux.update([ticker("okx"), ticker("okx")]);
    assert!(diff.is_empty());
    assert_eq!(mux.len(), 1);
    assert!(server.try_accept(INTERVAL).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_messages_are_routed_per_identity() {
    let (client, _connector, mut server) = fake_client(SessionStore::with_token("abc"));
    let (mut mux, inbox) = recording_mux(client);
    mux.update([ticker("okx"), ticker("binance")]);

    let mut sockets = Vec::new();
    for _ in 0..2 {
        let socket = server.accept().await;
        let exchange = if socket.url.contains("okx") { "okx" } else { "binance" };
        socket.frame(json!({"type": "ticker", "data": {"ex": exchange}}).to_string());
        sockets.push(socket);
    }

    for _ in 0..100 {
        if inbox.lock().unwrap().len() == 2 {
            break;
        }
        tokio::task::yield_now().await;
    }

    let inbox = inbox.lock().unwrap();
    assert_eq!(inbox.len(), 2);
    for (key, value) in inbox.iter() {
        assert_eq!(value["data"]["ex"], json!(key));
    }
}

#[tokio::test(start_paused = true)]
async fn test_close_all_and_drop_release_everything() {
    let (client, _connector, mut server) = fake_client(SessionStore::with_token("abc"));
    let (mut mux, _inbox) = recording_mux(client);
    mux.update([ticker("okx"), ticker("binance")]);
    let _a = server.accept().await;
    let _b = server.accept().await;

    let mut okx = mux.watch_state(&ticker("okx")).unwrap();
    mux.close_all();
    assert!(mux.is_empty());
    okx.wait_for(ConnectionState::is_terminal).await.unwrap();

    mux.update([ticker("kraken")]);
    let _c = server.accept().await;
    let mut kraken = mux.watch_state(&ticker("kraken")).unwrap();
    drop(mux);
    kraken.wait_for(ConnectionState::is_terminal).await.unwrap();
}
