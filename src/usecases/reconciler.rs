//! View Reconciler - Snapshot + Push Merge into a Live View
//!
//! One reconciler per feed. It seeds the view from an optional gateway
//! snapshot, folds every accepted push message per the feed's merge
//! policy, and publishes the result on a `watch` channel consumers
//! subscribe to. Only the reconciler writes its view.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Method;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::api::{ApiGateway, CallOptions};
use crate::adapters::feeds::{ChannelHandle, ChannelMultiplexer, MessageSink, SetDiff, StreamClient};
use crate::adapters::metrics::SyncMetrics;
use crate::domain::{
    ChannelIdentity, ConnectionState, Envelope, MergePolicy, PayloadShape, SyncError, ViewState,
};

/// Gateway call that seeds a feed.
#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    /// Endpoint path, including any query string.
    pub path: String,
    /// Member of the response object holding the seed, if nested.
    pub field: Option<String>,
    /// Per-call options.
    pub options: CallOptions,
}

impl SnapshotRequest {
    /// GET `path` with default options.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            field: None,
            options: CallOptions::default(),
        }
    }

    /// Seed from `response[field]` instead of the whole response.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Replace the call options.
    #[must_use]
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// Pull the seed out of a response.
    pub fn extract(&self, response: Value) -> Result<Value, SyncError> {
        let Some(field) = &self.field else {
            return Ok(response);
        };
        match response {
            Value::Object(mut map) => map
                .remove(field)
                .ok_or_else(|| SyncError::Protocol(format!("snapshot has no `{field}` member"))),
            _ => Err(SyncError::Protocol(format!(
                "snapshot is not an object, cannot read `{field}`"
            ))),
        }
    }
}

/// Channels a feed listens on.
#[derive(Debug, Clone)]
pub enum FeedChannels {
    /// One channel.
    Single(ChannelIdentity),
    /// A dynamic set managed by a multiplexer; one view key per identity.
    Keyed(Vec<ChannelIdentity>),
}

/// Declaration of one feed.
#[derive(Debug, Clone)]
pub struct FeedSpec {
    /// Feed name for logs and metrics.
    pub name: String,
    /// Optional seeding call.
    pub snapshot: Option<SnapshotRequest>,
    /// Channel(s) to subscribe to.
    pub channels: FeedChannels,
    /// Accepted `type` discriminant; other frames are ignored.
    pub accept_type: String,
    /// Merge policy.
    pub policy: MergePolicy,
    /// Shape a payload must have to be applied.
    pub shape: PayloadShape,
}

impl FeedSpec {
    /// Newest-first ring buffer capped at `capacity`.
    pub fn ring(
        name: impl Into<String>,
        channel: ChannelIdentity,
        accept_type: impl Into<String>,
        capacity: usize,
    ) -> Self {
        Self {
            name: name.into(),
            snapshot: None,
            channels: FeedChannels::Single(channel),
            accept_type: accept_type.into(),
            policy: MergePolicy::RingBuffer { capacity },
            shape: PayloadShape::Any,
        }
    }

    /// Wholesale replacement by payloads of `shape`.
    pub fn replace(
        name: impl Into<String>,
        channel: ChannelIdentity,
        accept_type: impl Into<String>,
        shape: PayloadShape,
    ) -> Self {
        Self {
            name: name.into(),
            snapshot: None,
            channels: FeedChannels::Single(channel),
            accept_type: accept_type.into(),
            policy: MergePolicy::Replace,
            shape,
        }
    }

    /// Keyed map over a dynamic channel set.
    pub fn keyed(
        name: impl Into<String>,
        channels: Vec<ChannelIdentity>,
        accept_type: impl Into<String>,
        shape: PayloadShape,
    ) -> Self {
        Self {
            name: name.into(),
            snapshot: None,
            channels: FeedChannels::Keyed(channels),
            accept_type: accept_type.into(),
            policy: MergePolicy::KeyedUpsert,
            shape,
        }
    }

    /// Seed the view with `request` at open time.
    #[must_use]
    pub fn with_snapshot(mut self, request: SnapshotRequest) -> Self {
        self.snapshot = Some(request);
        self
    }
}

/// Shared collaborators every reconciler needs.
#[derive(Clone)]
pub struct FeedContext {
    /// Gateway for snapshot calls.
    pub gateway: Arc<ApiGateway>,
    /// Client for push channels.
    pub streams: StreamClient,
    /// Optional metrics sink.
    pub metrics: Option<Arc<SyncMetrics>>,
}

impl FeedContext {
    /// Bundle a gateway and stream client.
    pub const fn new(gateway: Arc<ApiGateway>, streams: StreamClient) -> Self {
        Self {
            gateway,
            streams,
            metrics: None,
        }
    }

    /// Record view updates in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// State shared between the reconciler and its message sinks.
struct FeedShared {
    name: String,
    accept_type: String,
    policy: MergePolicy,
    shape: PayloadShape,
    state: watch::Sender<ViewState>,
    closed: CancellationToken,
    /// Owned channels per view key (keyed feeds only). Distinct
    /// identities may share a key, so a key stays live until its last
    /// owner is retired.
    live_keys: Mutex<HashMap<String, usize>>,
    metrics: Option<Arc<SyncMetrics>>,
}

impl FeedShared {
    fn push(&self, key: Option<&str>, frame: Value) {
        if self.closed.is_cancelled() {
            return;
        }

        let envelope = match Envelope::from_value(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(feed = %self.name, error = %e, "Dropping frame without envelope");
                self.dropped("protocol");
                return;
            }
        };

        if !envelope.is(&self.accept_type) {
            debug!(feed = %self.name, kind = %envelope.kind, "Ignoring frame of other type");
            return;
        }

        let keyed = self.policy == MergePolicy::KeyedUpsert;
        let applied = self.state.send_if_modified(|view| {
            // Checked under the view lock so a retired key cannot be
            // written back after removal.
            if self.closed.is_cancelled() || (keyed && !self.is_live(key)) {
                return false;
            }
            view.apply_push(self.policy, self.shape, key, envelope.payload)
        });

        if applied {
            if let Some(metrics) = &self.metrics {
                metrics.view_updates.with_label_values(&[&self.name]).inc();
            }
        } else {
            debug!(feed = %self.name, "Payload not applied");
            self.dropped("rejected");
        }
    }

    fn seed(&self, result: Result<Value, SyncError>) {
        if self.closed.is_cancelled() {
            return;
        }

        match result {
            Ok(mut snapshot) => {
                if self.policy == MergePolicy::KeyedUpsert {
                    if let Value::Object(map) = &mut snapshot {
                        map.retain(|key, _| self.is_live(Some(key.as_str())));
                    }
                }
                self.state
                    .send_modify(|view| view.apply_snapshot(self.policy, self.shape, snapshot));
                let view = self.state.borrow();
                match &view.error {
                    None => info!(feed = %self.name, entries = view.data.len(), "Feed seeded from snapshot"),
                    Some(e) => warn!(feed = %self.name, error = %e, "Snapshot did not fit the view"),
                }
            }
            Err(e) => {
                warn!(feed = %self.name, error = %e, "Snapshot failed; waiting for pushes");
                self.state.send_modify(|view| view.fail(e));
            }
        }
    }

    fn admit(&self, key: String) {
        *self
            .live_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(0) += 1;
    }

    /// Drop one owner of `key`; the view entry goes with the last one.
    fn retire(&self, key: &str) {
        let orphaned = {
            let mut owners = self
                .live_keys
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match owners.get_mut(key) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    owners.remove(key);
                    true
                }
                None => false,
            }
        };
        if orphaned {
            self.state.send_if_modified(|view| view.remove_key(key));
        } else {
            debug!(feed = %self.name, key, "Key still owned by another channel");
        }
    }

    fn is_live(&self, key: Option<&str>) -> bool {
        key.is_some_and(|key| {
            self.live_keys
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(key)
        })
    }

    fn dropped(&self, reason: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.frame_dropped(reason);
        }
    }
}

fn sink(feed: Arc<FeedShared>, key: Option<String>) -> MessageSink {
    Box::new(move |frame| feed.push(key.as_deref(), frame))
}

/// Live view of one feed.
///
/// Stays live until `close()` or drop, which releases the underlying
/// connection(s) and ignores any message still in flight.
pub struct ViewReconciler {
    shared: Arc<FeedShared>,
    channel: Option<ChannelHandle>,
    multiplexer: Option<ChannelMultiplexer>,
    snapshot: Option<JoinHandle<()>>,
}

impl ViewReconciler {
    /// Open a feed: start the snapshot call and subscribe.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(spec: FeedSpec, ctx: &FeedContext) -> Self {
        let (state, _) = watch::channel(ViewState::new(spec.policy, spec.snapshot.is_some()));
        let shared = Arc::new(FeedShared {
            name: spec.name,
            accept_type: spec.accept_type,
            policy: spec.policy,
            shape: spec.shape,
            state,
            closed: CancellationToken::new(),
            live_keys: Mutex::new(HashMap::new()),
            metrics: ctx.metrics.clone(),
        });
        let keyed = spec.policy == MergePolicy::KeyedUpsert;

        let (channel, multiplexer) = match spec.channels {
            FeedChannels::Single(identity) => {
                let key = keyed.then(|| identity.key());
                if let Some(key) = &key {
                    shared.admit(key.clone());
                }
                let handle = ctx
                    .streams
                    .subscribe(identity, sink(Arc::clone(&shared), key));
                (Some(handle), None)
            }
            FeedChannels::Keyed(identities) => {
                let feed = Arc::clone(&shared);
                let mut mux = ChannelMultiplexer::new(ctx.streams.clone(), move |identity| {
                    let key = identity.key();
                    feed.admit(key.clone());
                    sink(Arc::clone(&feed), Some(key))
                });
                mux.update(identities);
                (None, Some(mux))
            }
        };

        let snapshot = spec.snapshot.map(|request| {
            let gateway = Arc::clone(&ctx.gateway);
            let feed = Arc::clone(&shared);
            tokio::spawn(async move {
                let result = gateway
                    .call(&request.path, Method::GET, None, request.options.clone())
                    .await
                    .and_then(|response| request.extract(response));
                feed.seed(result);
            })
        });

        info!(
            feed = %shared.name,
            policy = ?shared.policy,
            seeded = snapshot.is_some(),
            "Feed opened"
        );

        Self {
            shared,
            channel,
            multiplexer,
            snapshot,
        }
    }

    /// Feed name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Observe the view.
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.shared.state.subscribe()
    }

    /// Current view.
    pub fn view(&self) -> ViewState {
        self.shared.state.borrow().clone()
    }

    /// Replace the channel set of a keyed feed.
    ///
    /// Removed identities are closed; a key leaves the view once no
    /// remaining identity maps to it. Single-channel feeds ignore this.
    pub fn set_channels<I>(&mut self, identities: I) -> SetDiff
    where
        I: IntoIterator<Item = ChannelIdentity>,
    {
        let Some(mux) = self.multiplexer.as_mut() else {
            warn!(feed = %self.shared.name, "set_channels on a single-channel feed");
            return SetDiff::default();
        };

        let diff = mux.update(identities);
        for identity in &diff.removed {
            self.shared.retire(&identity.key());
        }
        diff
    }

    /// Identities currently subscribed.
    pub fn channels(&self) -> Vec<ChannelIdentity> {
        match (&self.channel, &self.multiplexer) {
            (Some(handle), _) => vec![handle.identity().clone()],
            (None, Some(mux)) => mux.identities(),
            (None, None) => Vec::new(),
        }
    }

    /// Observe the lifecycle of one owned connection.
    pub fn connection_state(
        &self,
        identity: &ChannelIdentity,
    ) -> Option<watch::Receiver<ConnectionState>> {
        if let Some(handle) = self.channel.as_ref().filter(|h| h.identity() == identity) {
            return Some(handle.watch_state());
        }
        self.multiplexer.as_ref()?.watch_state(identity)
    }

    /// Send a client message on a single-channel feed, if open.
    pub fn send(&self, data: &Value) -> bool {
        self.channel.as_ref().is_some_and(|h| h.send(data))
    }

    /// Stop accepting messages and release every connection.
    pub fn close(&mut self) {
        if self.shared.closed.is_cancelled() {
            return;
        }
        self.shared.closed.cancel();
        if let Some(task) = self.snapshot.take() {
            task.abort();
        }
        if let Some(handle) = self.channel.take() {
            handle.close();
        }
        if let Some(mut mux) = self.multiplexer.take() {
            mux.close_all();
        }
        info!(feed = %self.shared.name, "Feed closed");
    }
}

impl Drop for ViewReconciler {
    fn drop(&mut self) {
        self.close();
    }
}
