//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP client, WebSockets, metrics server).
//!
//! Adapter categories:
//! - `api`: request/response gateway and login navigation
//! - `feeds`: push channel connections and the multiplexer
//! - `metrics`: Prometheus metrics export and health checks

pub mod api;
pub mod feeds;
pub mod metrics;
