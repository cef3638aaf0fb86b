//! Channel Multiplexer - One Live Connection per Channel Identity
//!
//! Keeps a dynamic set of channel connections in step with a desired
//! identity set (e.g. one ticker channel per connected exchange). Each
//! update is an explicit diff: added identities are opened, removed
//! ones closed terminally, unchanged ones left alone.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};

use super::connection::{ChannelHandle, StreamClient};
use crate::domain::{ChannelIdentity, ConnectionState};

/// Message callback for one connection.
pub type MessageSink = Box<dyn FnMut(Value) + Send + 'static>;

/// Builds the callback for a newly opened identity.
pub type SinkFactory = Box<dyn FnMut(&ChannelIdentity) -> MessageSink + Send + 'static>;

/// Result of one `update`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDiff {
    /// Identities opened by this update, sorted.
    pub added: Vec<ChannelIdentity>,
    /// Identities closed by this update, sorted.
    pub removed: Vec<ChannelIdentity>,
}

impl SetDiff {
    /// Whether the update changed nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Owns one `ChannelHandle` per identity.
///
/// Dropping the multiplexer closes every connection it owns.
pub struct ChannelMultiplexer {
    client: StreamClient,
    sinks: SinkFactory,
    connections: HashMap<ChannelIdentity, ChannelHandle>,
}

impl ChannelMultiplexer {
    /// Create an empty multiplexer; `sinks` is called once per opened identity.
    pub fn new<F>(client: StreamClient, sinks: F) -> Self
    where
        F: FnMut(&ChannelIdentity) -> MessageSink + Send + 'static,
    {
        Self {
            client,
            sinks: Box::new(sinks),
            connections: HashMap::new(),
        }
    }

    /// Reconcile the open set with `identities`.
    pub fn update<I>(&mut self, identities: I) -> SetDiff
    where
        I: IntoIterator<Item = ChannelIdentity>,
    {
        let wanted: HashSet<ChannelIdentity> = identities.into_iter().collect();

        let mut removed: Vec<ChannelIdentity> = self
            .connections
            .keys()
            .filter(|id| !wanted.contains(*id))
            .cloned()
            .collect();
        removed.sort();

        for identity in &removed {
            if let Some(handle) = self.connections.remove(identity) {
                handle.close();
            }
        }

        let mut added: Vec<ChannelIdentity> = wanted
            .into_iter()
            .filter(|id| !self.connections.contains_key(id))
            .collect();
        added.sort();

        for identity in &added {
            let sink = (self.sinks)(identity);
            let handle = self.client.subscribe(identity.clone(), sink);
            self.connections.insert(identity.clone(), handle);
        }

        let diff = SetDiff { added, removed };
        if diff.is_empty() {
            debug!(open = self.connections.len(), "Channel set unchanged");
        } else {
            info!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                open = self.connections.len(),
                "Channel set updated"
            );
        }
        diff
    }

    /// Close every owned connection.
    pub fn close_all(&mut self) {
        let count = self.connections.len();
        for (_, handle) in self.connections.drain() {
            handle.close();
        }
        if count > 0 {
            info!(closed = count, "Multiplexer closed");
        }
    }

    /// Identities currently owned, sorted.
    pub fn identities(&self) -> Vec<ChannelIdentity> {
        let mut ids: Vec<_> = self.connections.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Handle for one identity.
    pub fn handle(&self, identity: &ChannelIdentity) -> Option<&ChannelHandle> {
        self.connections.get(identity)
    }

    /// Observe one connection's lifecycle.
    pub fn watch_state(
        &self,
        identity: &ChannelIdentity,
    ) -> Option<watch::Receiver<ConnectionState>> {
        self.connections.get(identity).map(ChannelHandle::watch_state)
    }

    /// Number of owned connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is owned.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Drop for ChannelMultiplexer {
    fn drop(&mut self) {
        self.close_all();
    }
}
