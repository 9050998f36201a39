//! HTTP transport for client sessions
//!
//! Two endpoints carry the protocol: `GET /mcp` opens a session and
//! streams its outbound envelopes over SSE (the first event names the
//! message endpoint for that session), and `POST /messages?sessionId=`
//! submits one envelope to a session. Replies always travel over the
//! stream, so the POST acknowledges and returns while calls are still
//! outstanding. `/stats` and `/health` are diagnostic.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive},
        IntoResponse, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::catalog::Catalog;
use crate::kinds::CapabilityKind;
use crate::protocol::ServerInfo;
use crate::session::SessionManager;

#[derive(Clone)]
struct AppState {
    sessions: Arc<SessionManager>,
    catalog: Arc<Catalog>,
    identity: ServerInfo,
    started_at: DateTime<Utc>,
}

/// Client-facing HTTP server
pub struct HttpServer {
    state: AppState,
    addr: SocketAddr,
}

impl HttpServer {
    pub fn new(
        sessions: Arc<SessionManager>,
        catalog: Arc<Catalog>,
        identity: ServerInfo,
        addr: SocketAddr,
    ) -> Self {
        Self {
            state: AppState {
                sessions,
                catalog,
                identity,
                started_at: Utc::now(),
            },
            addr,
        }
    }

    /// Build the router
    fn router(state: AppState) -> Router {
        Router::new()
            .route("/mcp", get(sse_handler))
            .route("/messages", post(messages_handler))
            .route("/stats", get(stats_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Start the server
    pub async fn start(self) -> std::io::Result<()> {
        let app = Self::router(self.state);

        info!("gateway listening on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Closes the session when the client's stream goes away, however it
/// goes away; SessionManager::close_session tolerates the redundant call
struct SessionGuard {
    session_id: String,
    sessions: Arc<SessionManager>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.close_session(&self.session_id);
    }
}

/// Open a session and stream its outbound envelopes
async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (session, rx) = state.sessions.open_session();
    info!(session_id = %session.id, "client stream opened");

    let endpoint = format!("/messages?sessionId={}", session.id);
    let hello = stream::once(async move {
        Ok::<SseEvent, Infallible>(SseEvent::default().event("endpoint").data(endpoint))
    });

    let guard = SessionGuard {
        session_id: session.id.clone(),
        sessions: Arc::clone(&state.sessions),
    };
    let outbound = UnboundedReceiverStream::new(rx).map(move |payload| {
        let _held_open = &guard;
        Ok(SseEvent::default().event("message").data(payload))
    });

    Sse::new(hello.chain(outbound)).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Submit one envelope to a session
async fn messages_handler(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> impl IntoResponse {
    let Some(session_id) = query.session_id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": { "code": 400, "message": "Missing sessionId query parameter" }
            })),
        );
    };
    let Some(session) = state.sessions.get(&session_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": { "code": 404, "message": format!("Session not found: {}", session_id) }
            })),
        );
    };

    // The reply travels over the session's stream; handling may block on
    // a downstream call, so the POST acknowledges immediately
    let sessions = Arc::clone(&state.sessions);
    tokio::spawn(async move {
        sessions.handle_message(session, body).await;
    });

    (StatusCode::ACCEPTED, Json(json!({ "ok": true })))
}

/// Diagnostic snapshot of sessions and registered capabilities
async fn stats_handler(State(state): State<AppState>) -> Json<Value> {
    let tools = state.catalog.count(CapabilityKind::Tool);
    let resources = state.catalog.count(CapabilityKind::Resource);
    let templates = state.catalog.count(CapabilityKind::ResourceTemplate);
    let prompts = state.catalog.count(CapabilityKind::Prompt);

    Json(json!({
        "server": {
            "name": state.identity.name,
            "version": state.identity.version,
        },
        "activeSessions": state.sessions.session_count(),
        "capabilities": {
            "tools": tools,
            "resources": resources,
            "resourceTemplates": templates,
            "prompts": prompts,
            "total": tools + resources + templates + prompts,
        },
        "uptimeSeconds": (Utc::now() - state.started_at).num_seconds(),
    }))
}

/// Health check endpoint
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.sessions.session_count(),
    }))
}
