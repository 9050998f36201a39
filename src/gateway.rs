//! Gateway assembly
//!
//! Wires the shared catalog, router, session registry, and sync engine
//! around a downstream provider. The provider is the only piece supplied
//! from outside; everything else is owned here.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::catalog::Catalog;
use crate::config::GatewayConfig;
use crate::downstream::DownstreamProvider;
use crate::http::HttpServer;
use crate::kinds::ALL_KINDS;
use crate::router::RequestRouter;
use crate::session::SessionManager;
use crate::sync::SyncEngine;

/// A fully wired gateway
pub struct Gateway {
    config: GatewayConfig,
    pub catalog: Arc<Catalog>,
    pub router: Arc<RequestRouter>,
    pub sessions: Arc<SessionManager>,
    pub sync: Arc<SyncEngine>,
}

impl Gateway {
    pub fn new(provider: Arc<dyn DownstreamProvider>, config: GatewayConfig) -> Self {
        let catalog = Arc::new(Catalog::new());
        let router = Arc::new(RequestRouter::new(
            Arc::clone(&catalog),
            Arc::clone(&provider),
            config.call_timeout,
        ));
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&catalog),
            Arc::clone(&router),
            config.identity.clone(),
        ));
        let sync = SyncEngine::new(
            provider,
            Arc::clone(&catalog),
            Arc::clone(&sessions),
            config.identity.name.clone(),
        );
        Self {
            config,
            catalog,
            router,
            sessions,
            sync,
        }
    }

    /// Run the initial aggregation pass and start the event consumer
    pub fn start(&self) -> JoinHandle<()> {
        self.sync.resync(&ALL_KINDS);
        self.sync.start()
    }

    /// Start syncing and serve the client-facing transport until the
    /// listener fails
    pub async fn serve(self) -> std::io::Result<()> {
        self.start();
        HttpServer::new(
            Arc::clone(&self.sessions),
            Arc::clone(&self.catalog),
            self.config.identity.clone(),
            self.config.addr,
        )
        .start()
        .await
    }
}
