//! Conflux - MCP capability-aggregation gateway
//!
//! Presents many downstream MCP servers' tools, resources, resource
//! templates, and prompts as one server: namespaced aggregation with
//! collision resolution, event-driven catalog rebuilds, per-client
//! session multiplexing over SSE, and call routing back to each
//! capability's origin.

pub mod catalog;
pub mod config;
pub mod downstream;
pub mod error;
pub mod gateway;
pub mod http;
pub mod kinds;
pub mod namespace;
pub mod protocol;
pub mod router;
pub mod session;
pub mod sync;

pub use config::GatewayConfig;
pub use error::{ConfluxError, Result};
pub use gateway::Gateway;
pub use kinds::CapabilityKind;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
