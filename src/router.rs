//! Request routing to origin servers
//!
//! Resolves a namespaced key back to (origin server, original id),
//! dispatches the call with a bounded timeout, and shapes failures per
//! kind: a failing tool is application data (a successful response with
//! an error-flagged payload), while a failing resource or prompt is a
//! protocol-level invalid-parameters error.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::downstream::DownstreamProvider;
use crate::error::{ConfluxError, Result};
use crate::kinds::CapabilityKind;
use crate::protocol::ToolCallResult;

/// Routes inbound capability invocations to their origin server
pub struct RequestRouter {
    catalog: Arc<Catalog>,
    provider: Arc<dyn DownstreamProvider>,
    call_timeout: Duration,
}

impl RequestRouter {
    pub fn new(
        catalog: Arc<Catalog>,
        provider: Arc<dyn DownstreamProvider>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            provider,
            call_timeout,
        }
    }

    /// Dispatch one invocation. `key` is the namespaced identifier from
    /// the client (a global key, or for resource reads possibly a
    /// template-derived URI). An unresolved key never reaches an origin
    /// server.
    pub async fn dispatch(
        &self,
        kind: CapabilityKind,
        key: &str,
        request_params: &Value,
    ) -> Result<Value> {
        let (server, original_uid) = match kind {
            CapabilityKind::Resource | CapabilityKind::ResourceTemplate => {
                match self.catalog.resolve_resource_uri(key) {
                    Some(resolved) => (resolved.origin_server, resolved.original_uri),
                    None => {
                        return Err(ConfluxError::NotFound {
                            kind,
                            key: key.to_string(),
                        })
                    }
                }
            }
            _ => match self.catalog.lookup(kind, key) {
                Some(entry) => (entry.origin_server, entry.original_uid),
                None => {
                    return Err(ConfluxError::NotFound {
                        kind,
                        key: key.to_string(),
                    })
                }
            },
        };

        let Some(method) = kind.call_method() else {
            return Err(ConfluxError::InvalidRequest(format!(
                "{}s are list-only",
                kind.label()
            )));
        };

        let params = kind.origin_params(&original_uid, request_params);
        debug!(
            kind = kind.label(),
            key,
            server = %server,
            method,
            "dispatching to origin"
        );

        let outcome = match tokio::time::timeout(
            self.call_timeout,
            self.provider.call(&server, method, params),
        )
        .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(ConfluxError::OriginCall {
                server: server.clone(),
                message: err.to_string(),
            }),
            Err(_) => Err(ConfluxError::OriginTimeout {
                server: server.clone(),
                timeout_secs: self.call_timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(value) => Ok(value),
            Err(err) if kind == CapabilityKind::Tool => {
                warn!(key, server = %server, error = %err, "tool call failed");
                Ok(serde_json::to_value(ToolCallResult::error(
                    err.to_string(),
                ))?)
            }
            Err(err) => {
                warn!(
                    kind = kind.label(),
                    key,
                    server = %server,
                    error = %err,
                    "origin call failed"
                );
                Err(err)
            }
        }
    }
}
