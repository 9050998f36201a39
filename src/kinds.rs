//! Capability kind table
//!
//! The four MCP capability kinds and everything that differs between
//! them: the field that uniquely identifies a definition, the listing
//! and invocation methods, the list-changed notification to emit when a
//! kind's key set changes, and how an inbound call's parameters map onto
//! the origin server's call. Keeping this as data on the enum keeps the
//! router and catalog free of per-kind conditionals.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::protocol::methods;

/// A capability kind aggregated by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Tool,
    Resource,
    ResourceTemplate,
    Prompt,
}

/// All kinds, in catalog iteration order
pub const ALL_KINDS: [CapabilityKind; 4] = [
    CapabilityKind::Tool,
    CapabilityKind::Resource,
    CapabilityKind::ResourceTemplate,
    CapabilityKind::Prompt,
];

impl CapabilityKind {
    /// Human-readable label used in error messages and logs
    pub fn label(&self) -> &'static str {
        match self {
            CapabilityKind::Tool => "tool",
            CapabilityKind::Resource => "resource",
            CapabilityKind::ResourceTemplate => "resource template",
            CapabilityKind::Prompt => "prompt",
        }
    }

    /// Field that uniquely identifies a raw definition of this kind
    pub fn uid_field(&self) -> &'static str {
        match self {
            CapabilityKind::Tool => "name",
            CapabilityKind::Resource => "uri",
            CapabilityKind::ResourceTemplate => "uriTemplate",
            CapabilityKind::Prompt => "name",
        }
    }

    /// Client-facing listing method
    pub fn list_method(&self) -> &'static str {
        match self {
            CapabilityKind::Tool => methods::LIST_TOOLS,
            CapabilityKind::Resource => methods::LIST_RESOURCES,
            CapabilityKind::ResourceTemplate => methods::LIST_RESOURCE_TEMPLATES,
            CapabilityKind::Prompt => methods::LIST_PROMPTS,
        }
    }

    /// Field wrapping the definitions array in a list response
    pub fn list_result_field(&self) -> &'static str {
        match self {
            CapabilityKind::Tool => "tools",
            CapabilityKind::Resource => "resources",
            CapabilityKind::ResourceTemplate => "resourceTemplates",
            CapabilityKind::Prompt => "prompts",
        }
    }

    /// Method used to invoke this kind against its origin server.
    /// Resource templates are list-only; concrete URIs derived from a
    /// template are read through the resource kind.
    pub fn call_method(&self) -> Option<&'static str> {
        match self {
            CapabilityKind::Tool => Some(methods::CALL_TOOL),
            CapabilityKind::Resource => Some(methods::READ_RESOURCE),
            CapabilityKind::ResourceTemplate => None,
            CapabilityKind::Prompt => Some(methods::GET_PROMPT),
        }
    }

    /// Notification emitted when this kind's key set changes. Templates
    /// share the resources notification on the wire.
    pub fn changed_notification(&self) -> &'static str {
        match self {
            CapabilityKind::Tool => methods::TOOLS_LIST_CHANGED,
            CapabilityKind::Resource | CapabilityKind::ResourceTemplate => {
                methods::RESOURCES_LIST_CHANGED
            }
            CapabilityKind::Prompt => methods::PROMPTS_LIST_CHANGED,
        }
    }

    /// Map an inbound call's parameters onto the origin server's call,
    /// with the namespaced identifier replaced by the original one
    pub fn origin_params(&self, original_uid: &str, request: &Value) -> Value {
        match self {
            CapabilityKind::Tool | CapabilityKind::Prompt => json!({
                "name": original_uid,
                "arguments": request.get("arguments").cloned().unwrap_or_else(|| json!({})),
            }),
            CapabilityKind::Resource | CapabilityKind::ResourceTemplate => json!({
                "uri": original_uid,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_fields() {
        assert_eq!(CapabilityKind::Tool.uid_field(), "name");
        assert_eq!(CapabilityKind::Resource.uid_field(), "uri");
        assert_eq!(CapabilityKind::ResourceTemplate.uid_field(), "uriTemplate");
        assert_eq!(CapabilityKind::Prompt.uid_field(), "name");
    }

    #[test]
    fn test_templates_are_list_only() {
        assert!(CapabilityKind::ResourceTemplate.call_method().is_none());
        for kind in [
            CapabilityKind::Tool,
            CapabilityKind::Resource,
            CapabilityKind::Prompt,
        ] {
            assert!(kind.call_method().is_some());
        }
    }

    #[test]
    fn test_templates_share_resources_notification() {
        assert_eq!(
            CapabilityKind::ResourceTemplate.changed_notification(),
            CapabilityKind::Resource.changed_notification()
        );
        assert_ne!(
            CapabilityKind::Tool.changed_notification(),
            CapabilityKind::Prompt.changed_notification()
        );
    }

    #[test]
    fn test_tool_origin_params_keep_arguments() {
        let request = json!({"name": "Files__search", "arguments": {"q": "x"}});
        let params = CapabilityKind::Tool.origin_params("search", &request);
        assert_eq!(params["name"], "search");
        assert_eq!(params["arguments"]["q"], "x");
    }

    #[test]
    fn test_resource_origin_params_use_uri_only() {
        let request = json!({"uri": "Files__file:///tmp/a", "extra": 1});
        let params = CapabilityKind::Resource.origin_params("file:///tmp/a", &request);
        assert_eq!(params, json!({"uri": "file:///tmp/a"}));
    }

    #[test]
    fn test_missing_arguments_default_to_empty_object() {
        let params = CapabilityKind::Prompt.origin_params("greet", &json!({"name": "X__greet"}));
        assert_eq!(params["arguments"], json!({}));
    }
}
