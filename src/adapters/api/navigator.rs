//! Headless login navigator.
//!
//! The shipped binary has no UI; "navigating to login" means logging the
//! expiry and remembering that the login surface is showing until a new
//! session is installed.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::ports::LoginNavigator;

/// Navigator that records the redirect in a flag and the log.
#[derive(Debug, Default)]
pub struct HeadlessNavigator {
    on_login: AtomicBool,
}

impl HeadlessNavigator {
    /// Start away from the login surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave the login surface after a fresh login.
    pub fn logged_in(&self) {
        self.on_login.store(false, Ordering::SeqCst);
    }
}

impl LoginNavigator for HeadlessNavigator {
    fn is_on_login_surface(&self) -> bool {
        self.on_login.load(Ordering::SeqCst)
    }

    fn navigate_to_login(&self) {
        if !self.on_login.swap(true, Ordering::SeqCst) {
            warn!("Session rejected by backend; a new login is required");
        }
    }
}
