//! Aggregated capability catalog
//!
//! The namespaced view of every capability exposed by every eligible
//! downstream server. Each kind's mapping is rebuilt wholesale by the
//! sync engine; sessions only ever read. Rebuild-then-diff is the
//! change-detection contract: a rebuild reports whether the kind's key
//! set gained or lost keys, and value changes to an unchanged key are
//! deliberately not a change signal.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::downstream::ServerSnapshot;
use crate::kinds::{CapabilityKind, ALL_KINDS};
use crate::namespace::{join_key, split_key, NamespaceMap};

/// One capability under its aggregated identity
#[derive(Debug, Clone, Serialize)]
pub struct NamespacedCapability {
    pub kind: CapabilityKind,
    pub origin_server: String,
    pub original_uid: String,
    pub global_key: String,
    /// Raw definition with its unique-id field replaced by the global key
    pub definition: Value,
}

/// A concrete resource URI resolved back to its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub origin_server: String,
    pub original_uri: String,
}

#[derive(Default)]
struct CatalogInner {
    namespaces: NamespaceMap,
    entries: HashMap<CapabilityKind, HashMap<String, NamespacedCapability>>,
}

/// The shared catalog. Mutated only by the sync engine; all sessions
/// read through it on every list request, so there is no per-session
/// capability cache to invalidate.
pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        for kind in ALL_KINDS {
            entries.insert(kind, HashMap::new());
        }
        Self {
            inner: RwLock::new(CatalogInner {
                namespaces: NamespaceMap::default(),
                entries,
            }),
        }
    }

    /// Install the namespace assignment for the current sync pass
    pub fn set_namespaces(&self, namespaces: NamespaceMap) {
        self.inner.write().namespaces = namespaces;
    }

    /// Rebuild one kind's mapping from the eligible servers of the
    /// current pass. Returns whether the key set changed.
    pub fn rebuild(&self, kind: CapabilityKind, eligible: &[ServerSnapshot]) -> bool {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let mut fresh: HashMap<String, NamespacedCapability> = HashMap::new();
        for server in eligible {
            let Some(segment) = inner.namespaces.segment_for(&server.display_name) else {
                warn!(server = %server.display_name, "server missing from namespace pass, skipping");
                continue;
            };
            for raw in server.capabilities(kind) {
                let Some(uid) = raw.get(kind.uid_field()).and_then(Value::as_str) else {
                    warn!(
                        server = %server.display_name,
                        kind = kind.label(),
                        "definition missing {:?} field, skipping",
                        kind.uid_field()
                    );
                    continue;
                };
                let global_key = join_key(segment, uid);
                let mut definition = raw.clone();
                if let Some(obj) = definition.as_object_mut() {
                    obj.insert(kind.uid_field().to_string(), json!(global_key));
                }
                fresh.insert(
                    global_key.clone(),
                    NamespacedCapability {
                        kind,
                        origin_server: server.display_name.clone(),
                        original_uid: uid.to_string(),
                        global_key,
                        definition,
                    },
                );
            }
        }

        let slot = inner.entries.entry(kind).or_default();
        let changed =
            slot.len() != fresh.len() || fresh.keys().any(|key| !slot.contains_key(key));
        *slot = fresh;
        changed
    }

    /// Look up one capability by its global key
    pub fn lookup(&self, kind: CapabilityKind, global_key: &str) -> Option<NamespacedCapability> {
        self.inner
            .read()
            .entries
            .get(&kind)
            .and_then(|m| m.get(global_key))
            .cloned()
    }

    /// Shaped definitions for one kind, ordered by global key
    pub fn list(&self, kind: CapabilityKind) -> Vec<Value> {
        let inner = self.inner.read();
        let Some(entries) = inner.entries.get(&kind) else {
            return Vec::new();
        };
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        keys.iter()
            .filter_map(|key| entries.get(*key).map(|e| e.definition.clone()))
            .collect()
    }

    /// Number of registered capabilities for one kind
    pub fn count(&self, kind: CapabilityKind) -> usize {
        self.inner
            .read()
            .entries
            .get(&kind)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Resolve a resource URI back to its origin. Tries a direct hit on
    /// the resource mapping, then on the template mapping (clients may
    /// pass the namespaced template itself), then falls back to
    /// splitting on the first delimiter so that concrete URIs produced
    /// from a template dereference without being pre-registered.
    pub fn resolve_resource_uri(&self, uri: &str) -> Option<ResolvedResource> {
        let inner = self.inner.read();
        for kind in [CapabilityKind::Resource, CapabilityKind::ResourceTemplate] {
            if let Some(entry) = inner.entries.get(&kind).and_then(|m| m.get(uri)) {
                return Some(ResolvedResource {
                    origin_server: entry.origin_server.clone(),
                    original_uri: entry.original_uid.clone(),
                });
            }
        }
        let (segment, remainder) = split_key(uri)?;
        let server = inner.namespaces.server_for(segment)?;
        Some(ResolvedResource {
            origin_server: server.to_string(),
            original_uri: remainder.to_string(),
        })
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downstream::ServerStatus;

    fn server_with_tools(name: &str, tools: &[&str]) -> ServerSnapshot {
        ServerSnapshot {
            display_name: name.to_string(),
            status: ServerStatus::Connected,
            disabled: false,
            identity: None,
            tools: tools
                .iter()
                .map(|t| json!({"name": t, "description": "d", "inputSchema": {"type": "object"}}))
                .collect(),
            resources: vec![],
            resource_templates: vec![],
            prompts: vec![],
        }
    }

    fn pass(catalog: &Catalog, servers: &[ServerSnapshot]) -> bool {
        catalog.set_namespaces(NamespaceMap::allocate(servers));
        catalog.rebuild(CapabilityKind::Tool, servers)
    }

    #[test]
    fn test_rebuild_namespaces_definitions() {
        let catalog = Catalog::new();
        let servers = vec![server_with_tools("File Server", &["search"])];
        assert!(pass(&catalog, &servers));

        let entry = catalog
            .lookup(CapabilityKind::Tool, "File_Server__search")
            .unwrap();
        assert_eq!(entry.origin_server, "File Server");
        assert_eq!(entry.original_uid, "search");
        assert_eq!(entry.definition["name"], "File_Server__search");
        assert_eq!(entry.definition["description"], "d");
        assert_eq!(catalog.count(CapabilityKind::Tool), 1);
    }

    #[test]
    fn test_rebuild_reports_key_set_changes_only() {
        let catalog = Catalog::new();
        let servers = vec![server_with_tools("a", &["x", "y"])];
        assert!(pass(&catalog, &servers));

        // Same key set again: no change
        assert!(!pass(&catalog, &servers));

        // Value change under an unchanged key: not a change signal
        let mut mutated = vec![server_with_tools("a", &["x", "y"])];
        mutated[0].tools[0]["description"] = json!("different");
        assert!(!pass(&catalog, &mutated));

        // Removed key: change
        assert!(pass(&catalog, &[server_with_tools("a", &["x"])]));

        // Added key: change
        assert!(pass(&catalog, &[server_with_tools("a", &["x", "z"])]));
    }

    #[test]
    fn test_rebuild_clears_stale_entries() {
        let catalog = Catalog::new();
        pass(&catalog, &[server_with_tools("Search", &["lookup"])]);
        assert!(catalog
            .lookup(CapabilityKind::Tool, "Search__lookup")
            .is_some());

        assert!(pass(&catalog, &[]));
        assert!(catalog
            .lookup(CapabilityKind::Tool, "Search__lookup")
            .is_none());
        assert_eq!(catalog.count(CapabilityKind::Tool), 0);
    }

    #[test]
    fn test_list_is_shaped_and_ordered() {
        let catalog = Catalog::new();
        pass(&catalog, &[server_with_tools("b", &["t"]), server_with_tools("a", &["t"])]);
        let listed = catalog.list(CapabilityKind::Tool);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["name"], "a__t");
        assert_eq!(listed[1]["name"], "b__t");
    }

    #[test]
    fn test_definition_missing_uid_is_skipped() {
        let catalog = Catalog::new();
        let mut server = server_with_tools("a", &["ok"]);
        server.tools.push(json!({"description": "no name"}));
        pass(&catalog, &[server]);
        assert_eq!(catalog.count(CapabilityKind::Tool), 1);
    }

    #[test]
    fn test_resolve_resource_uri_direct_and_fallback() {
        let catalog = Catalog::new();
        let server = ServerSnapshot {
            display_name: "Files".to_string(),
            status: ServerStatus::Connected,
            disabled: false,
            identity: None,
            tools: vec![],
            resources: vec![json!({"uri": "file:///known", "name": "known"})],
            resource_templates: vec![json!({"uriTemplate": "file:///{path}", "name": "files"})],
            prompts: vec![],
        };
        let servers = vec![server];
        catalog.set_namespaces(NamespaceMap::allocate(&servers));
        catalog.rebuild(CapabilityKind::Resource, &servers);
        catalog.rebuild(CapabilityKind::ResourceTemplate, &servers);

        // Direct resource hit
        assert_eq!(
            catalog.resolve_resource_uri("Files__file:///known").unwrap(),
            ResolvedResource {
                origin_server: "Files".into(),
                original_uri: "file:///known".into()
            }
        );
        // Direct template hit
        assert_eq!(
            catalog
                .resolve_resource_uri("Files__file:///{path}")
                .unwrap()
                .original_uri,
            "file:///{path}"
        );
        // Template-derived instance via the split fallback
        assert_eq!(
            catalog
                .resolve_resource_uri("Files__file:///tmp/notes.txt")
                .unwrap(),
            ResolvedResource {
                origin_server: "Files".into(),
                original_uri: "file:///tmp/notes.txt".into()
            }
        );
        // Unknown segment
        assert!(catalog.resolve_resource_uri("Nope__file:///x").is_none());
        // No delimiter at all
        assert!(catalog.resolve_resource_uri("plain-uri").is_none());
    }
}
