//! Session state shared by the gateway and every channel connection.
//!
//! The token is injected through a `SessionStore` handle rather than a
//! global. Readers always go through the store, so a cleared session is
//! observed on the very next call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// An authenticated session issued by the external login flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    issued_at: DateTime<Utc>,
}

impl Session {
    /// Wrap a bearer token obtained from the login flow.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_at: Utc::now(),
        }
    }

    /// Opaque bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// When the session was installed.
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

/// Cloneable accessor/mutator for the process-wide session.
///
/// All clones share one value. `subscribe()` lets long-lived components
/// (channel connections) react when the session is cleared.
#[derive(Debug, Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Option<Session>>>,
    /// Bumped by every `set()`; 0 until the first session.
    epoch: Arc<AtomicU64>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create an empty store (logged out).
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a store already holding a session for `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(Session::new(token));
        store
    }

    /// Current session, read fresh.
    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    /// Current bearer token, read fresh.
    pub fn token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.token.clone())
    }

    /// Whether a session is live.
    pub fn is_active(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Install a new session, replacing any previous one.
    pub fn set(&self, session: Session) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.tx.send_replace(Some(session));
    }

    /// Number of sessions installed so far. Clearing does not change it,
    /// so two reads with the same epoch saw no login in between.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Destroy the session.
    ///
    /// Returns `true` only for the call that actually removed a live
    /// session, so concurrent callers can agree on who reacts to it.
    pub fn clear(&self) -> bool {
        self.tx.send_if_modified(|current| current.take().is_some())
    }

    /// Observe session changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}
