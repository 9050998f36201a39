//! Event-driven catalog reconciliation
//!
//! Subscribes once to the downstream manager's event bus and rebuilds
//! the affected catalog kinds on every relevant event. A rebuild pass
//! recomputes the eligible-server set (connection status, disabled flag,
//! and the self-reference guard), reallocates namespaces, rebuilds each
//! affected kind wholesale, and pushes a list-changed notification to
//! every live session for each kind whose key set actually changed.
//! Redundant resyncs are free: no change, no notifications.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::downstream::{DownstreamProvider, HubEvent, ServerSnapshot};
use crate::kinds::{CapabilityKind, ALL_KINDS};
use crate::namespace::NamespaceMap;
use crate::session::SessionManager;

/// Keeps the catalog consistent with the downstream world
pub struct SyncEngine {
    provider: Arc<dyn DownstreamProvider>,
    catalog: Arc<Catalog>,
    sessions: Arc<SessionManager>,
    /// The gateway's own identity name; a downstream server reporting it
    /// is the gateway itself seen through a loop and is never aggregated
    identity_name: String,
    events: Mutex<Option<broadcast::Receiver<HubEvent>>>,
}

impl SyncEngine {
    /// Construct and subscribe to the event bus. The subscription
    /// happens here, exactly once; `start` only drains it.
    pub fn new(
        provider: Arc<dyn DownstreamProvider>,
        catalog: Arc<Catalog>,
        sessions: Arc<SessionManager>,
        identity_name: impl Into<String>,
    ) -> Arc<Self> {
        let events = Mutex::new(Some(provider.subscribe()));
        Arc::new(Self {
            provider,
            catalog,
            sessions,
            identity_name: identity_name.into(),
            events,
        })
    }

    /// Spawn the event consumer. Returns the task handle; dropping it
    /// does not stop the consumer.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let Some(mut events) = self.events.lock().take() else {
            warn!("sync engine already started, ignoring");
            return tokio::spawn(async {});
        };
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let kinds = event.affected_kinds();
                        if kinds.is_empty() {
                            debug!(?event, "event carries no catalog impact");
                            continue;
                        }
                        debug!(?event, "resyncing");
                        engine.resync(kinds);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event bus lagged, resyncing all kinds");
                        engine.resync(&ALL_KINDS);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("event bus closed, sync engine stopping");
                        break;
                    }
                }
            }
        })
    }

    /// One reconciliation pass over the given kinds. Runs to completion
    /// without suspension, so catalog readers never observe a
    /// half-rebuilt pass.
    pub fn resync(&self, kinds: &[CapabilityKind]) {
        let eligible = self.eligible_servers();
        self.catalog.set_namespaces(NamespaceMap::allocate(&eligible));

        let mut notified: HashSet<&'static str> = HashSet::new();
        for kind in kinds {
            let changed = self.catalog.rebuild(*kind, &eligible);
            if !changed {
                continue;
            }
            debug!(kind = kind.label(), "key set changed");
            if self.sessions.session_count() == 0 {
                continue;
            }
            // Resource and template kinds share a wire notification;
            // one pass emits each method at most once
            let method = kind.changed_notification();
            if notified.insert(method) {
                self.sessions.notify_all(method);
            }
        }
    }

    fn eligible_servers(&self) -> Vec<ServerSnapshot> {
        self.provider
            .servers()
            .into_iter()
            .filter(|server| {
                if !server.is_eligible() {
                    return false;
                }
                let self_referential = server
                    .identity
                    .as_ref()
                    .is_some_and(|identity| identity.name == self.identity_name);
                if self_referential {
                    warn!(
                        server = %server.display_name,
                        "downstream reports the gateway's own identity, excluding"
                    );
                    return false;
                }
                true
            })
            .collect()
    }
}
