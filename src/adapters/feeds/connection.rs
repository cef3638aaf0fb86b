//! Channel Connection - Supervised Push Channel with Auto-Reconnect
//!
//! Each subscription runs as one tokio task that owns its socket, its
//! reconnect timer and its outbound queue. Frames are parsed as JSON and
//! handed to the subscriber's callback in arrival order.
//!
//! Lifecycle:
//! - Connecting → Open on handshake success
//! - Open → ClosedRetryable on any ordinary close or transport error,
//!   then one reconnect after the fixed interval (no backoff)
//! - any → ClosedTerminal on the forbidden close code, on `close()`,
//!   on handle drop, or when the session is cleared

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::ws::WsConnector;
use crate::adapters::metrics::SyncMetrics;
use crate::domain::{
    ChannelIdentity, ConnectionState, Session, SessionStore, SyncError, TerminalReason,
};
use crate::ports::{StreamConnector, StreamEvent, StreamSession};

/// Close code the server uses for "not entitled to this channel".
pub const FORBIDDEN_CLOSE_CODE: u16 = 4003;

/// Default delay between a retryable close and the next attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Query parameter carrying the session token.
const TOKEN_PARAM: &str = "token";

/// Opens channel connections against one streaming base address.
#[derive(Clone)]
pub struct StreamClient {
    base_url: Url,
    reconnect_interval: Duration,
    session: SessionStore,
    connector: Arc<dyn StreamConnector>,
    metrics: Option<Arc<SyncMetrics>>,
}

impl StreamClient {
    /// Create a client for `base_url` (e.g. `wss://host/ws`).
    pub fn new(
        base_url: &str,
        session: SessionStore,
        connector: Arc<dyn StreamConnector>,
    ) -> Result<Self, SyncError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SyncError::Protocol(format!("invalid stream base {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Protocol(format!(
                "stream base {base_url} cannot carry channel paths"
            )));
        }

        Ok(Self {
            base_url,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            session,
            connector,
            metrics: None,
        })
    }

    /// Client using the tokio-tungstenite transport.
    pub fn websocket(base_url: &str, session: SessionStore) -> Result<Self, SyncError> {
        Self::new(base_url, session, Arc::new(WsConnector))
    }

    /// Override the reconnect interval for every subscription.
    #[must_use]
    pub const fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Record connection metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Reconnect interval applied by `subscribe`.
    pub const fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    /// Session read on every connect attempt.
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Full URL for `identity` carrying `token`.
    pub fn channel_url(&self, identity: &ChannelIdentity, token: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.extend(identity.name().split('/'));
        }
        url.query_pairs_mut()
            .extend_pairs(identity.params())
            .extend_pairs(token.map(|t| (TOKEN_PARAM, t)));
        if url.query() == Some("") {
            url.set_query(None);
        }
        url
    }

    /// Open a supervised connection; `on_message` receives every parsed
    /// frame in arrival order.
    ///
    /// Returns immediately. Must be called inside a tokio runtime.
    pub fn subscribe<F>(&self, identity: ChannelIdentity, on_message: F) -> ChannelHandle
    where
        F: FnMut(Value) + Send + 'static,
    {
        self.subscribe_with_interval(identity, self.reconnect_interval, on_message)
    }

    /// Like `subscribe`, with a per-subscription reconnect interval.
    pub fn subscribe_with_interval<F>(
        &self,
        identity: ChannelIdentity,
        reconnect_interval: Duration,
        on_message: F,
    ) -> ChannelHandle
    where
        F: FnMut(Value) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicU32::new(0));

        let task = ChannelTask {
            client: self.clone(),
            identity: identity.clone(),
            reconnect_interval,
            cancel: cancel.clone(),
            state: state_tx,
            outbound: outbound_rx,
            attempts: Arc::clone(&attempts),
        };

        ChannelHandle {
            identity,
            cancel,
            state: state_rx,
            outbound: outbound_tx,
            attempts,
            task: Some(tokio::spawn(task.run(on_message))),
        }
    }
}

/// Caller's handle on one channel connection.
///
/// Dropping the handle closes the connection.
pub struct ChannelHandle {
    identity: ChannelIdentity,
    cancel: CancellationToken,
    state: watch::Receiver<ConnectionState>,
    outbound: mpsc::UnboundedSender<String>,
    attempts: Arc<AtomicU32>,
    task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    /// Identity this handle supervises.
    pub const fn identity(&self) -> &ChannelIdentity {
        &self.identity
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe lifecycle changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Connect attempts made so far.
    pub fn connect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Send `data` if the connection is open right now.
    ///
    /// Returns `false` and drops the data otherwise. Nothing is queued
    /// for a later connection.
    pub fn send(&self, data: &Value) -> bool {
        if self.state() != ConnectionState::Open {
            return false;
        }
        self.outbound.send(data.to_string()).is_ok()
    }

    /// Close for good: cancels any pending reconnect and the socket.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Wait until the connection is terminally closed.
    pub async fn closed(mut self) -> ConnectionState {
        self.close();
        let reached = self.state.wait_for(ConnectionState::is_terminal).await.is_ok();
        if !reached {
            warn!(channel = %self.identity, "Channel task ended without a terminal state");
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        *self.state.borrow()
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// How an open session ended.
enum Disconnect {
    Retry,
    Forbidden,
    Stopped(TerminalReason),
}

/// State owned by one connection's supervising task.
struct ChannelTask {
    client: StreamClient,
    identity: ChannelIdentity,
    reconnect_interval: Duration,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
    outbound: mpsc::UnboundedReceiver<String>,
    attempts: Arc<AtomicU32>,
}

impl ChannelTask {
    #[instrument(skip_all, fields(channel = %self.identity))]
    async fn run<F>(mut self, mut on_message: F)
    where
        F: FnMut(Value) + Send + 'static,
    {
        let mut session_rx = self.client.session.subscribe();

        let reason = loop {
            self.state.send_replace(ConnectionState::Connecting);

            // Anything queued while disconnected is dropped, never replayed.
            while self.outbound.try_recv().is_ok() {}

            let token = self.client.session.token();
            let url = self.client.channel_url(&self.identity, token.as_deref());
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(metrics) = &self.client.metrics {
                metrics
                    .channel_connects
                    .with_label_values(&[self.identity.name()])
                    .inc();
            }

            let connector = Arc::clone(&self.client.connector);
            let connected =
                match until_stopped(&self.cancel, &mut session_rx, connector.connect(url.as_str()))
                    .await
                {
                    Ok(result) => result,
                    Err(reason) => break reason,
                };

            match connected {
                Ok(mut stream) => {
                    info!("Channel connected");
                    self.state.send_replace(ConnectionState::Open);
                    if let Some(metrics) = &self.client.metrics {
                        metrics.channels_open.inc();
                    }

                    let outcome = self
                        .pump(stream.as_mut(), &mut session_rx, &mut on_message)
                        .await;

                    if let Some(metrics) = &self.client.metrics {
                        metrics.channels_open.dec();
                    }

                    match outcome {
                        Disconnect::Retry => {}
                        Disconnect::Forbidden => {
                            let err = SyncError::ForbiddenChannel {
                                channel: self.identity.name().to_string(),
                            };
                            error!(code = FORBIDDEN_CLOSE_CODE, error = %err, "Channel closed as forbidden, not reconnecting");
                            break TerminalReason::Forbidden;
                        }
                        Disconnect::Stopped(reason) => {
                            stream.close().await;
                            break reason;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Channel connect failed"),
            }

            self.state.send_replace(ConnectionState::ClosedRetryable);
            debug!(
                delay_ms = self.reconnect_interval.as_millis(),
                "Scheduling channel reconnect"
            );
            if let Err(reason) = until_stopped(
                &self.cancel,
                &mut session_rx,
                tokio::time::sleep(self.reconnect_interval),
            )
            .await
            {
                break reason;
            }
        };

        info!(reason = ?reason, "Channel closed");
        self.state
            .send_replace(ConnectionState::ClosedTerminal(reason));
    }

    /// Read frames until the session ends, fails, or we are stopped.
    async fn pump<F>(
        &mut self,
        stream: &mut dyn StreamSession,
        session_rx: &mut watch::Receiver<Option<Session>>,
        on_message: &mut F,
    ) -> Disconnect
    where
        F: FnMut(Value),
    {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Disconnect::Stopped(TerminalReason::Unsubscribed);
                }
                () = session_ended(session_rx) => {
                    return Disconnect::Stopped(TerminalReason::SessionEnded);
                }
                Some(text) = self.outbound.recv() => {
                    if let Err(e) = stream.send_text(text).await {
                        warn!(error = %e, "Channel send failed");
                    }
                }
                event = stream.next_event() => match event {
                    StreamEvent::Frame(text) => self.deliver(&text, on_message),
                    StreamEvent::Closed { code: Some(FORBIDDEN_CLOSE_CODE) } => {
                        return Disconnect::Forbidden;
                    }
                    StreamEvent::Closed { code } => {
                        info!(code = ?code, "Channel closed by server");
                        return Disconnect::Retry;
                    }
                    StreamEvent::Failed(e) => {
                        warn!(error = %e, "Channel transport error");
                        return Disconnect::Retry;
                    }
                },
            }
        }
    }

    fn deliver<F>(&self, text: &str, on_message: &mut F)
    where
        F: FnMut(Value),
    {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => on_message(value),
            Err(e) => {
                let err = SyncError::Protocol(e.to_string());
                warn!(error = %err, len = text.len(), "Dropping malformed frame");
                if let Some(metrics) = &self.client.metrics {
                    metrics.frame_dropped("malformed");
                }
            }
        }
    }
}

/// Run `fut` unless the handle is closed or the session ends first.
async fn until_stopped<T>(
    cancel: &CancellationToken,
    session_rx: &mut watch::Receiver<Option<Session>>,
    fut: impl Future<Output = T>,
) -> Result<T, TerminalReason> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TerminalReason::Unsubscribed),
        () = session_ended(session_rx) => Err(TerminalReason::SessionEnded),
        out = fut => Ok(out),
    }
}

/// Resolves once the session transitions to cleared.
async fn session_ended(session_rx: &mut watch::Receiver<Option<Session>>) {
    loop {
        if session_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        if session_rx.borrow_and_update().is_none() {
            return;
        }
    }
}
