//! Edge Gateway - request router for a reserved API namespace
//!
//! Every inbound request is classified once:
//! - Paths outside the reserved prefix pass through to page serving
//! - Allow-listed paths are served by in-process handlers
//! - Anything else under the prefix is rejected with a fixed 503, or
//!   forwarded to an upstream origin when running in proxy mode
//!
//! The classification itself lives in [`gateway`] and is a pure function;
//! [`middleware`] and [`gateway::edge`] adapt it to an async server and to a
//! synchronous edge host.

pub mod config;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod server;

pub use config::{ConfigError, GatewayConfig};
pub use gateway::{Dispatch, Gateway, GatewayMode, Verdict};

/// Application result type
pub type Result<T> = anyhow::Result<T>;
