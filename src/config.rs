//! Gateway configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::ServerInfo;

/// Default bound on any single downstream call
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 300;

/// Runtime knobs for the gateway. Loading these from files or flags is
/// the embedder's concern; the binary maps its CLI onto this struct.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the HTTP transport binds
    pub addr: SocketAddr,
    /// Bound on any single downstream call
    pub call_timeout: Duration,
    /// Capacity of the downstream event bus
    pub event_capacity: usize,
    /// Identity the gateway answers handshakes with; also the
    /// self-reference guard key
    pub identity: ServerInfo,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            addr: ([127, 0, 0, 1], 37373).into(),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            event_capacity: 1024,
            identity: ServerInfo {
                name: "conflux".to_string(),
                version: crate::VERSION.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.call_timeout, Duration::from_secs(300));
        assert_eq!(config.identity.name, "conflux");
    }
}
