//! Namespace allocation for aggregated capability keys
//!
//! Every sync pass assigns each eligible downstream server a unique,
//! delimiter-safe segment derived from its display name. Global keys are
//! `segment + "__" + original_uid`. Assignments are recomputed from
//! scratch each pass and are not stable across passes.

use std::collections::HashMap;

use crate::downstream::ServerSnapshot;

/// Separator between the namespace segment and the original identifier
pub const NAMESPACE_DELIMITER: &str = "__";

/// Collapse a display name into a namespace segment: runs of characters
/// outside the ASCII alphanumeric set become a single `_`, with no
/// leading or trailing separator so the segment can never contain or
/// abut the `__` delimiter.
pub fn sanitize_segment(display_name: &str) -> String {
    let mut out = String::with_capacity(display_name.len());
    let mut pending_sep = false;
    for c in display_name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            out.push(c);
            pending_sep = false;
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() {
        out.push_str("server");
    }
    out
}

/// One sync pass's 1:1 mapping between servers and namespace segments
#[derive(Debug, Clone, Default)]
pub struct NamespaceMap {
    by_segment: HashMap<String, String>,
    by_server: HashMap<String, String>,
}

impl NamespaceMap {
    /// Allocate segments for an ordered pass of eligible servers.
    /// Collisions on the sanitized name take `_1`, `_2`, ... suffixes in
    /// encounter order. Pure function of the input sequence.
    pub fn allocate(servers: &[ServerSnapshot]) -> Self {
        let mut map = Self::default();
        for server in servers {
            let base = sanitize_segment(&server.display_name);
            let mut segment = base.clone();
            let mut suffix = 1;
            while map.by_segment.contains_key(&segment) {
                segment = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            map.by_segment
                .insert(segment.clone(), server.display_name.clone());
            map.by_server
                .insert(server.display_name.clone(), segment);
        }
        map
    }

    /// Segment assigned to a server in this pass
    pub fn segment_for(&self, display_name: &str) -> Option<&str> {
        self.by_server.get(display_name).map(String::as_str)
    }

    /// Server a segment resolves to in this pass
    pub fn server_for(&self, segment: &str) -> Option<&str> {
        self.by_segment.get(segment).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_segment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_segment.is_empty()
    }
}

/// Build a global key from a segment and an original identifier
pub fn join_key(segment: &str, original_uid: &str) -> String {
    format!("{}{}{}", segment, NAMESPACE_DELIMITER, original_uid)
}

/// Split a global key on the first delimiter occurrence
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(NAMESPACE_DELIMITER)
}
