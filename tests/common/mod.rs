//! Shared test fixtures: a scripted in-memory stream transport.
//!
//! `FakeConnector` hands every accepted connection to the test as a
//! `ServerSide`, which pushes events into the client and reads what the
//! client sent.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use live_feed_sync::adapters::api::{ApiGateway, GatewayConfig, HeadlessNavigator};
use live_feed_sync::adapters::feeds::StreamClient;
use live_feed_sync::domain::{SessionStore, SyncError};
use live_feed_sync::ports::{StreamConnector, StreamEvent, StreamSession};
use live_feed_sync::usecases::FeedContext;

pub const BASE: &str = "wss://dash.test/ws";
/// Gateway base nothing listens on; for push-only feeds.
pub const NO_API: &str = "http://127.0.0.1:9";
pub const INTERVAL: Duration = Duration::from_millis(3000);

/// Server end of one accepted connection.
pub struct ServerSide {
    pub url: String,
    pub events: mpsc::UnboundedSender<StreamEvent>,
    pub sent: mpsc::UnboundedReceiver<String>,
}

impl ServerSide {
    pub fn frame(&self, text: impl Into<String>) {
        let _ = self.events.send(StreamEvent::Frame(text.into()));
    }

    pub fn close(&self, code: u16) {
        let _ = self.events.send(StreamEvent::Closed { code: Some(code) });
    }
}

/// Receives connections accepted by a `FakeConnector`.
pub struct FakeServer {
    accepted: mpsc::UnboundedReceiver<ServerSide>,
    pub urls: Arc<Mutex<Vec<String>>>,
}

impl FakeServer {
    /// Next accepted connection; panics if none arrives in time.
    pub async fn accept(&mut self) -> ServerSide {
        tokio::time::timeout(Duration::from_secs(60), self.accepted.recv())
            .await
            .expect("no connection within 60s")
            .expect("connector dropped")
    }

    /// Next accepted connection within `within`, if any.
    pub async fn try_accept(&mut self, within: Duration) -> Option<ServerSide> {
        tokio::time::timeout(within, self.accepted.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

pub struct FakeConnector {
    accepted: mpsc::UnboundedSender<ServerSide>,
    urls: Arc<Mutex<Vec<String>>>,
    refusals: AtomicU32,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, FakeServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let urls = Arc::new(Mutex::new(Vec::new()));
        let connector = Arc::new(Self {
            accepted: tx,
            urls: Arc::clone(&urls),
            refusals: AtomicU32::new(0),
        });
        (connector, FakeServer { accepted: rx, urls })
    }

    /// Fail the next `n` handshakes.
    pub fn refuse_next(&self, n: u32) {
        self.refusals.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl StreamConnector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamSession>, SyncError> {
        self.urls.lock().unwrap().push(url.to_string());

        if self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SyncError::Transport("connection refused".to_string()));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        self.accepted
            .send(ServerSide {
                url: url.to_string(),
                events: events_tx,
                sent: sent_rx,
            })
            .map_err(|_| SyncError::Transport("server gone".to_string()))?;

        Ok(Box::new(FakeSession {
            events: events_rx,
            sent: sent_tx,
        }))
    }
}

struct FakeSession {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    sent: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl StreamSession for FakeSession {
    async fn next_event(&mut self) -> StreamEvent {
        match self.events.recv().await {
            Some(event) => event,
            // Test dropped its end: behave like a silent, still-open socket.
            None => std::future::pending().await,
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), SyncError> {
        self.sent
            .send(text)
            .map_err(|_| SyncError::Transport("peer gone".to_string()))
    }

    async fn close(&mut self) {}
}

/// Stream client over a fresh fake transport.
pub fn fake_client(session: SessionStore) -> (StreamClient, Arc<FakeConnector>, FakeServer) {
    let (connector, server) = FakeConnector::new();
    let client = StreamClient::new(BASE, session, connector.clone() as Arc<dyn StreamConnector>)
        .unwrap()
        .with_reconnect_interval(INTERVAL);
    (client, connector, server)
}

/// Serve `router` on an ephemeral local port; returns its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Gateway against `base_url` with a headless navigator.
pub fn gateway(base_url: &str, session: SessionStore) -> Arc<ApiGateway> {
    let config = GatewayConfig {
        base_url: base_url.to_string(),
        ..GatewayConfig::default()
    };
    Arc::new(ApiGateway::new(config, session, Arc::new(HeadlessNavigator::new())).unwrap())
}

/// Reconciler context over a fake transport and a gateway at `api_base`.
pub fn feed_context(api_base: &str, session: SessionStore) -> (FeedContext, FakeServer) {
    let (streams, _connector, server) = fake_client(session.clone());
    (FeedContext::new(gateway(api_base, session), streams), server)
}
