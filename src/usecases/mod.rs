//! Use Cases Layer - Feed Reconciliation
//!
//! Orchestrates the gateway and channel adapters into live views.
//!
//! Use cases:
//! - `ViewReconciler`: snapshot + push merge for one feed
//! - `feeds`: the standard dashboard feed catalog

pub mod feeds;
pub mod reconciler;

pub use reconciler::{FeedChannels, FeedContext, FeedSpec, SnapshotRequest, ViewReconciler};
