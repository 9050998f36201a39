//! Boundary to the downstream lifecycle manager
//!
//! The gateway does not spawn, health-check, or restart downstream MCP
//! servers; an external manager owns their lifecycle. This module is the
//! seam: read-only snapshots of the managed connections, the event bus
//! the manager publishes lifecycle and capability changes on, and the
//! generic "call this server" primitive. [`ServerRegistry`] is the
//! in-memory implementation the embedding process drives.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{ConfluxError, Result};
use crate::kinds::{CapabilityKind, ALL_KINDS};

/// Connection state of a downstream server, as reported by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Identity a downstream server announced during its own handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerIdentity {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Point-in-time view of one managed downstream connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub display_name: String,
    pub status: ServerStatus,
    #[serde(default)]
    pub disabled: bool,
    pub identity: Option<ServerIdentity>,
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default)]
    pub resources: Vec<Value>,
    #[serde(default)]
    pub resource_templates: Vec<Value>,
    #[serde(default)]
    pub prompts: Vec<Value>,
}

impl ServerSnapshot {
    /// Only connected, non-disabled servers participate in aggregation
    pub fn is_eligible(&self) -> bool {
        self.status == ServerStatus::Connected && !self.disabled
    }

    /// Raw capability definitions for one kind
    pub fn capabilities(&self, kind: CapabilityKind) -> &[Value] {
        match kind {
            CapabilityKind::Tool => &self.tools,
            CapabilityKind::Resource => &self.resources,
            CapabilityKind::ResourceTemplate => &self.resource_templates,
            CapabilityKind::Prompt => &self.prompts,
        }
    }
}

/// Hub-wide state transitions published by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubState {
    Starting,
    Ready,
    Restarting,
    Restarted,
    Stopped,
    Error,
}

impl HubState {
    /// Transitions into these states rebuild the whole catalog;
    /// starting/restarting are transient and resolve into one of them
    pub fn triggers_resync(&self) -> bool {
        matches!(
            self,
            HubState::Ready | HubState::Restarted | HubState::Stopped | HubState::Error
        )
    }
}

/// Events the downstream manager publishes
#[derive(Debug, Clone)]
pub enum HubEvent {
    ToolsChanged { server: String },
    ResourcesChanged { server: String },
    PromptsChanged { server: String },
    ConfigChanged,
    StateChanged(HubState),
}

impl HubEvent {
    /// Which capability kinds a subscriber must resync for this event.
    /// An empty slice means the event carries no catalog impact.
    pub fn affected_kinds(&self) -> &'static [CapabilityKind] {
        match self {
            HubEvent::ToolsChanged { .. } => &[CapabilityKind::Tool],
            HubEvent::ResourcesChanged { .. } => {
                &[CapabilityKind::Resource, CapabilityKind::ResourceTemplate]
            }
            HubEvent::PromptsChanged { .. } => &[CapabilityKind::Prompt],
            HubEvent::ConfigChanged => &ALL_KINDS,
            HubEvent::StateChanged(state) if state.triggers_resync() => &ALL_KINDS,
            HubEvent::StateChanged(_) => &[],
        }
    }
}

/// Per-server RPC client, implemented outside this crate
#[async_trait]
pub trait DownstreamClient: Send + Sync {
    /// Issue one request against this server and await its result
    async fn request(&self, method: &str, params: Value) -> Result<Value>;
}

/// What the gateway consumes from the downstream lifecycle manager
#[async_trait]
pub trait DownstreamProvider: Send + Sync {
    /// Snapshot of all managed connections, in registration order
    fn servers(&self) -> Vec<ServerSnapshot>;

    /// Subscribe to lifecycle and capability-change events
    fn subscribe(&self) -> broadcast::Receiver<HubEvent>;

    /// Call a downstream server by display name
    async fn call(&self, server: &str, method: &str, params: Value) -> Result<Value>;
}

struct ServerEntry {
    snapshot: ServerSnapshot,
    client: Option<Arc<dyn DownstreamClient>>,
}

/// In-memory implementation of [`DownstreamProvider`]
///
/// The embedding lifecycle manager upserts snapshots as servers connect,
/// change, or drop, attaches each server's RPC client, and publishes the
/// matching [`HubEvent`]s. Registration order is preserved because the
/// namespace allocation pass is order-dependent.
pub struct ServerRegistry {
    servers: RwLock<Vec<ServerEntry>>,
    events: broadcast::Sender<HubEvent>,
}

impl ServerRegistry {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            servers: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Insert or replace a server snapshot, keeping its registration
    /// position. A `None` client leaves any existing client attached.
    pub fn upsert(&self, snapshot: ServerSnapshot, client: Option<Arc<dyn DownstreamClient>>) {
        let mut servers = self.servers.write();
        match servers
            .iter_mut()
            .find(|e| e.snapshot.display_name == snapshot.display_name)
        {
            Some(entry) => {
                entry.snapshot = snapshot;
                if client.is_some() {
                    entry.client = client;
                }
            }
            None => servers.push(ServerEntry { snapshot, client }),
        }
    }

    /// Drop a server entirely
    pub fn remove(&self, display_name: &str) -> bool {
        let mut servers = self.servers.write();
        let before = servers.len();
        servers.retain(|e| e.snapshot.display_name != display_name);
        servers.len() != before
    }

    /// Update just the connection status of a server
    pub fn set_status(&self, display_name: &str, status: ServerStatus) -> bool {
        let mut servers = self.servers.write();
        match servers
            .iter_mut()
            .find(|e| e.snapshot.display_name == display_name)
        {
            Some(entry) => {
                entry.snapshot.status = status;
                true
            }
            None => false,
        }
    }

    /// Publish an event to all subscribers; a bus with no subscribers
    /// drops the event, which is fine before the sync engine starts
    pub fn publish(&self, event: HubEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl DownstreamProvider for ServerRegistry {
    fn servers(&self) -> Vec<ServerSnapshot> {
        self.servers
            .read()
            .iter()
            .map(|e| e.snapshot.clone())
            .collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    async fn call(&self, server: &str, method: &str, params: Value) -> Result<Value> {
        // Clone the client out so the lock is not held across the await
        let client = {
            let servers = self.servers.read();
            servers
                .iter()
                .find(|e| e.snapshot.display_name == server)
                .and_then(|e| e.client.clone())
        };
        let client = client.ok_or_else(|| ConfluxError::UnknownServer(server.to_string()))?;
        client.request(method, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(name: &str, status: ServerStatus, disabled: bool) -> ServerSnapshot {
        ServerSnapshot {
            display_name: name.to_string(),
            status,
            disabled,
            identity: None,
            tools: vec![],
            resources: vec![],
            resource_templates: vec![],
            prompts: vec![],
        }
    }

    #[test]
    fn test_eligibility() {
        assert!(snapshot("a", ServerStatus::Connected, false).is_eligible());
        assert!(!snapshot("a", ServerStatus::Connected, true).is_eligible());
        assert!(!snapshot("a", ServerStatus::Connecting, false).is_eligible());
        assert!(!snapshot("a", ServerStatus::Disconnected, false).is_eligible());
        assert!(!snapshot("a", ServerStatus::Error, false).is_eligible());
    }

    #[test]
    fn test_affected_kinds() {
        assert_eq!(
            HubEvent::ToolsChanged {
                server: "a".into()
            }
            .affected_kinds(),
            &[CapabilityKind::Tool][..]
        );
        assert_eq!(
            HubEvent::ResourcesChanged {
                server: "a".into()
            }
            .affected_kinds()
            .len(),
            2
        );
        assert_eq!(HubEvent::ConfigChanged.affected_kinds().len(), 4);
        assert_eq!(
            HubEvent::StateChanged(HubState::Ready).affected_kinds().len(),
            4
        );
        assert!(HubEvent::StateChanged(HubState::Starting)
            .affected_kinds()
            .is_empty());
        assert!(HubEvent::StateChanged(HubState::Restarting)
            .affected_kinds()
            .is_empty());
    }

    #[test]
    fn test_registry_preserves_registration_order() {
        let registry = ServerRegistry::new(16);
        registry.upsert(snapshot("beta", ServerStatus::Connected, false), None);
        registry.upsert(snapshot("alpha", ServerStatus::Connected, false), None);
        registry.upsert(snapshot("beta", ServerStatus::Disconnected, false), None);

        let names: Vec<String> = registry
            .servers()
            .into_iter()
            .map(|s| s.display_name)
            .collect();
        assert_eq!(names, vec!["beta", "alpha"]);
        assert_eq!(registry.servers()[0].status, ServerStatus::Disconnected);
    }

    #[test]
    fn test_registry_remove_and_set_status() {
        let registry = ServerRegistry::new(16);
        registry.upsert(snapshot("a", ServerStatus::Connecting, false), None);
        assert!(registry.set_status("a", ServerStatus::Connected));
        assert!(!registry.set_status("missing", ServerStatus::Connected));
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
    }

    #[tokio::test]
    async fn test_call_without_client_is_unknown_server() {
        let registry = ServerRegistry::new(16);
        registry.upsert(snapshot("a", ServerStatus::Connected, false), None);
        let err = registry
            .call("a", "tools/call", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfluxError::UnknownServer(_)));
    }
}
