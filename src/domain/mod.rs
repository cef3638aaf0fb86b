//! Domain layer - Sync state and protocol types.
//!
//! Pure types shared by the gateway, channel connections and the
//! reconcilers: the session, channel identities and lifecycle, the push
//! envelope, view models and the error taxonomy. No I/O lives here.

pub mod channel;
pub mod envelope;
pub mod error;
pub mod session;
pub mod view;

// Re-export core types for convenience
pub use channel::{ChannelIdentity, ConnectionState, TerminalReason};
pub use envelope::Envelope;
pub use error::SyncError;
pub use session::{Session, SessionStore};
pub use view::{MergePolicy, PayloadShape, ViewData, ViewState};
