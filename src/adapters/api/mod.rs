//! Backend API Adapter
//!
//! Implements the request/response gateway used for snapshot reads.
//!
//! Sub-modules:
//! - `gateway`: authenticated HTTP client with deadlines and error normalization
//! - `navigator`: headless `LoginNavigator` used by the binary
//! - `types`: call options and error body types

pub mod gateway;
pub mod navigator;
pub mod types;

pub use gateway::{ApiGateway, GatewayConfig};
pub use navigator::HeadlessNavigator;
pub use types::CallOptions;
