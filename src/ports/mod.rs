//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces the sync core requires from the outside
//! world. Adapters implement these traits.
//!
//! Port categories:
//! - `LoginNavigator`: login surface of the surrounding application
//! - `StreamConnector` / `StreamSession`: push channel sockets

pub mod navigator;
pub mod stream;

pub use navigator::LoginNavigator;
pub use stream::{StreamConnector, StreamEvent, StreamSession};
