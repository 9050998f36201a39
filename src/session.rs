//! Per-client sessions
//!
//! Each long-lived client connection gets its own protocol endpoint:
//! the handshake is negotiated independently per session, while list and
//! call handlers read straight through to the shared catalog and router.
//! A session holds no capability state of its own. Outbound envelopes
//! travel over the session's queue to whatever transport opened it.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::{ConfluxError, Result};
use crate::kinds::CapabilityKind;
use crate::protocol::{
    methods, ClientInfo, InitializeResult, RpcNotification, RpcRequest, RpcResponse,
    ServerCapabilities, ServerInfo, PROTOCOL_VERSION,
};
use crate::router::RequestRouter;

/// One client's live connection
pub struct Session {
    pub id: String,
    outbound: mpsc::UnboundedSender<String>,
    client: Mutex<Option<ClientInfo>>,
}

impl Session {
    /// Identity the client announced during this session's handshake
    pub fn client_info(&self) -> Option<ClientInfo> {
        self.client.lock().clone()
    }

    fn send_raw(&self, payload: String) -> Result<()> {
        self.outbound
            .send(payload)
            .map_err(|_| ConfluxError::SessionClosed(self.id.clone()))
    }

    /// Queue a response for delivery on this session's transport
    pub fn send_response(&self, response: &RpcResponse) -> Result<()> {
        self.send_raw(serde_json::to_string(response)?)
    }

    /// Queue a notification for delivery on this session's transport
    pub fn send_notification(&self, method: &str) -> Result<()> {
        self.send_raw(serde_json::to_string(&RpcNotification::new(method))?)
    }
}

/// Registry of live sessions plus the shared endpoint logic
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    catalog: Arc<Catalog>,
    router: Arc<RequestRouter>,
    identity: ServerInfo,
}

impl SessionManager {
    pub fn new(catalog: Arc<Catalog>, router: Arc<RequestRouter>, identity: ServerInfo) -> Self {
        Self {
            sessions: DashMap::new(),
            catalog,
            router,
            identity,
        }
    }

    /// Open a session: allocate an id, register it, and hand back the
    /// receiving end of its outbound queue for the transport to drain
    pub fn open_session(&self) -> (Arc<Session>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session {
            id: Uuid::new_v4().to_string(),
            outbound: tx,
            client: Mutex::new(None),
        });
        self.sessions.insert(session.id.clone(), session.clone());
        info!(
            session_id = %session.id,
            active = self.sessions.len(),
            "session opened"
        );
        (session, rx)
    }

    /// Remove a session. Idempotent: closing an already-removed session
    /// is a no-op, so transport teardown may race with explicit close.
    pub fn close_session(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some(_) => {
                info!(
                    session_id,
                    active = self.sessions.len(),
                    "session closed"
                );
                true
            }
            None => false,
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| Arc::clone(s.value()))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Push a notification to every live session, skipping any whose
    /// transport already went away
    pub fn notify_all(&self, method: &str) {
        for entry in self.sessions.iter() {
            if let Err(err) = entry.value().send_notification(method) {
                warn!(
                    session_id = %entry.key(),
                    method,
                    error = %err,
                    "notification delivery failed, skipping session"
                );
            }
        }
    }

    /// Forward one raw envelope to a session's endpoint. The caller is
    /// told when the session does not exist instead of the message being
    /// dropped.
    pub async fn route_message(&self, session_id: &str, raw: &str) -> Result<()> {
        let session = self
            .get(session_id)
            .ok_or_else(|| ConfluxError::UnknownSession(session_id.to_string()))?;
        self.handle_message(session, raw.to_string()).await;
        Ok(())
    }

    /// Run one envelope through a session's endpoint. Any reply is
    /// queued on the session's transport; a reply for a session that
    /// closed mid-call is discarded, never redirected.
    pub async fn handle_message(&self, session: Arc<Session>, raw: String) {
        let request = match serde_json::from_str::<RpcRequest>(&raw) {
            Ok(request) => request,
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "unparsable message");
                let response =
                    RpcResponse::error(None, -32700, format!("Parse error: {}", err));
                let _ = session.send_response(&response);
                return;
            }
        };

        if request.is_notification() {
            self.handle_notification(&session, &request);
            return;
        }

        let id = request.id.clone();
        let response = match self.handle_request(&session, request).await {
            Ok(result) => RpcResponse::success(id, result),
            Err(err) => RpcResponse::from_error(id, err),
        };
        if session.send_response(&response).is_err() {
            debug!(session_id = %session.id, "session closed, result discarded");
        }
    }

    fn handle_notification(&self, session: &Session, request: &RpcRequest) {
        match request.method.as_str() {
            methods::INITIALIZED => {
                debug!(session_id = %session.id, "session initialized");
            }
            other => {
                debug!(session_id = %session.id, method = other, "notification absorbed");
            }
        }
    }

    async fn handle_request(&self, session: &Session, request: RpcRequest) -> Result<Value> {
        match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(session, &request.params),
            methods::PING => Ok(json!({})),
            methods::LIST_TOOLS => Ok(self.list(CapabilityKind::Tool)),
            methods::LIST_RESOURCES => Ok(self.list(CapabilityKind::Resource)),
            methods::LIST_RESOURCE_TEMPLATES => Ok(self.list(CapabilityKind::ResourceTemplate)),
            methods::LIST_PROMPTS => Ok(self.list(CapabilityKind::Prompt)),
            methods::CALL_TOOL => {
                let name = required_str(&request.params, "name", methods::CALL_TOOL)?;
                self.router
                    .dispatch(CapabilityKind::Tool, name, &request.params)
                    .await
            }
            methods::READ_RESOURCE => {
                let uri = required_str(&request.params, "uri", methods::READ_RESOURCE)?;
                self.router
                    .dispatch(CapabilityKind::Resource, uri, &request.params)
                    .await
            }
            methods::GET_PROMPT => {
                let name = required_str(&request.params, "name", methods::GET_PROMPT)?;
                self.router
                    .dispatch(CapabilityKind::Prompt, name, &request.params)
                    .await
            }
            other => Err(ConfluxError::MethodNotFound(other.to_string())),
        }
    }

    fn handle_initialize(&self, session: &Session, params: &Value) -> Result<Value> {
        if let Some(info) = params.get("clientInfo") {
            match serde_json::from_value::<ClientInfo>(info.clone()) {
                Ok(client) => {
                    debug!(
                        session_id = %session.id,
                        client = %client.name,
                        version = %client.version,
                        "handshake"
                    );
                    *session.client.lock() = Some(client);
                }
                Err(err) => {
                    debug!(session_id = %session.id, error = %err, "unreadable clientInfo");
                }
            }
        }
        let protocol_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION)
            .to_string();
        let result = InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities::default(),
            server_info: self.identity.clone(),
        };
        Ok(serde_json::to_value(result)?)
    }

    fn list(&self, kind: CapabilityKind) -> Value {
        json!({ kind.list_result_field(): self.catalog.list(kind) })
    }
}

fn required_str<'a>(params: &'a Value, field: &str, method: &str) -> Result<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ConfluxError::InvalidRequest(format!("{} requires a string {:?}", method, field))
        })
}
