//! Resilient Gateway - Core Library
//!
//! Proxies task and user CRUD calls to an upstream API. Reads go through a
//! circuit breaker and fall back to the last known good snapshots when the
//! upstream is unavailable; writes pass straight through.

pub mod breaker;
pub mod cache;
pub mod cli;
pub mod error;
pub mod middleware;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod service;
pub mod settings;
pub mod telemetry;
pub mod upstream;

pub use error::{ServiceError, UpstreamError};
pub use service::{Gateway, TaskService, UserService};
