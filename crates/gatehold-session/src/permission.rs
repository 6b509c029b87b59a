//! Player data and permission checks.
//!
//! A [`UserRecord`] is what the store returns for a player: a list of
//! permission nodes, each optionally limited to a set of contexts. At
//! check time the player's current contexts come from their
//! [`QueryContextCache`], and only nodes whose contexts are satisfied
//! count.
//!
//! ```text
//! node "build.place"  contexts {world=creative}  value true
//!
//! check("build.place") with {world=creative, server=lobby} → True
//! check("build.place") with {world=survival}              → Undefined
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use gatehold_protocol::Uuid;
use serde::{Deserialize, Serialize};

use crate::SessionTable;

// ---------------------------------------------------------------------------
// Tristate
// ---------------------------------------------------------------------------

/// Result of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tristate {
    /// Explicitly granted.
    True,
    /// Explicitly denied.
    False,
    /// Nothing is known: no matching node, or no data loaded.
    Undefined,
}

impl Tristate {
    /// Collapses to a boolean; `Undefined` counts as denied.
    pub fn as_bool(self) -> bool {
        matches!(self, Self::True)
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

// ---------------------------------------------------------------------------
// ContextSet
// ---------------------------------------------------------------------------

/// A set of `key=value` pairs describing where a player is.
///
/// Keys are unique; inserting a key again replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextSet(BTreeMap<String, String>);

impl ContextSet {
    /// An empty set. Empty node contexts apply everywhere.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the set with `key=value` added.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds or replaces `key=value`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// The value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// `true` if every pair in `self` is also in `current`.
    pub fn is_satisfied_by(&self, current: &ContextSet) -> bool {
        self.0
            .iter()
            .all(|(k, v)| current.0.get(k).is_some_and(|cv| cv == v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for ContextSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

/// One permission assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionNode {
    /// Dotted permission key. A trailing `.*` matches everything below it.
    pub key: String,
    /// Granted (`true`) or denied (`false`).
    pub value: bool,
    /// Contexts the node is limited to. Empty means everywhere.
    #[serde(default)]
    pub contexts: ContextSet,
}

impl PermissionNode {
    /// A node that applies in every context.
    pub fn new(key: impl Into<String>, value: bool) -> Self {
        Self {
            key: key.into(),
            value,
            contexts: ContextSet::new(),
        }
    }

    /// Restricts the node to `contexts`.
    pub fn in_contexts(mut self, contexts: ContextSet) -> Self {
        self.contexts = contexts;
        self
    }

    /// How specifically this node matches `permission`: `Some(len)` of the
    /// matched prefix, with exact matches scoring highest.
    fn match_len(&self, permission: &str) -> Option<usize> {
        if self.key == permission {
            return Some(usize::MAX);
        }
        if self.key == "*" {
            return Some(0);
        }
        let prefix = self.key.strip_suffix(".*")?;
        permission
            .strip_prefix(prefix)
            .filter(|rest| rest.starts_with('.'))
            .map(|_| prefix.len())
    }
}

/// A player's loaded authorization data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub nodes: Vec<PermissionNode>,
}

impl UserRecord {
    /// A record with no permissions.
    pub fn new(id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            nodes: Vec::new(),
        }
    }

    /// Returns the record with `node` appended.
    pub fn with_node(mut self, node: PermissionNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Resolves `permission` in `contexts`.
    ///
    /// The most specific applicable node wins (exact key beats wildcard,
    /// longer wildcard beats shorter). Among equally specific nodes, a
    /// denial wins.
    pub fn check(&self, permission: &str, contexts: &ContextSet) -> Tristate {
        let mut best: Option<(usize, bool)> = None;

        for node in &self.nodes {
            if !node.contexts.is_satisfied_by(contexts) {
                continue;
            }
            let Some(len) = node.match_len(permission) else {
                continue;
            };
            best = match best {
                Some((best_len, _)) if best_len > len => best,
                Some((best_len, best_value)) if best_len == len => {
                    Some((len, best_value && node.value))
                }
                _ => Some((len, node.value)),
            };
        }

        best.map_or(Tristate::Undefined, |(_, value)| value.into())
    }
}

// ---------------------------------------------------------------------------
// QueryContextCache
// ---------------------------------------------------------------------------

/// The contexts a player's permission checks run in.
///
/// Created when the player enters the game and dropped when they leave.
/// Callers move the player between contexts with
/// [`update`](Self::update).
#[derive(Debug)]
pub struct QueryContextCache {
    id: Uuid,
    contexts: RwLock<ContextSet>,
}

impl QueryContextCache {
    pub fn new(id: Uuid, contexts: ContextSet) -> Self {
        Self {
            id,
            contexts: RwLock::new(contexts),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// A snapshot of the current contexts.
    pub fn current(&self) -> ContextSet {
        self.contexts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replaces the current contexts.
    pub fn update(&self, contexts: ContextSet) {
        *self.contexts.write().unwrap_or_else(|e| e.into_inner()) = contexts;
    }
}

// ---------------------------------------------------------------------------
// PermissionHolder
// ---------------------------------------------------------------------------

/// The permission view attached to a player in the game.
///
/// Reads through to the session table on every check, so a record
/// replaced later (for example by a reload) is picked up. When the
/// player has no data, every check is `Undefined`.
#[derive(Clone)]
pub struct PermissionHolder {
    id: Uuid,
    table: Arc<SessionTable>,
}

impl PermissionHolder {
    pub(crate) fn new(id: Uuid, table: Arc<SessionTable>) -> Self {
        Self { id, table }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the player's data is present.
    pub fn is_loaded(&self) -> bool {
        self.table.record(self.id).is_some()
    }

    /// Checks `permission` in the player's current contexts.
    pub fn check_permission(&self, permission: &str) -> Tristate {
        let Some(record) = self.table.record(self.id) else {
            return Tristate::Undefined;
        };
        let contexts = self
            .table
            .context(self.id)
            .map(|cache| cache.current())
            .unwrap_or_default();
        record.check(permission, &contexts)
    }

    /// `check_permission` collapsed to a boolean.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.check_permission(permission).as_bool()
    }
}

impl fmt::Debug for PermissionHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionHolder")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
