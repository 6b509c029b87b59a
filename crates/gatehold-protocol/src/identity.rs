//! Player identity: who a connecting client claims to be, and who they
//! turn out to be.
//!
//! An [`Identity`] starts life as whatever the client put in its `Hello`
//! packet. That claim may be *incomplete* (a name with no id). After the
//! login pipeline runs it is replaced by either:
//!
//! - a **verified** identity returned by the authentication service, or
//! - a **fallback** identity whose id is derived from the name alone
//!   (see [`offline_uuid`]).
//!
//! The fallback derivation must match what every other server in the
//! ecosystem computes, otherwise an offline-mode player would get a
//! different id (and therefore different permissions) per server.

use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix hashed together with the player name to derive offline ids.
const OFFLINE_PREFIX: &str = "OfflinePlayer:";

/// Derives the deterministic id used for players that were not verified.
///
/// This is a name-based (version 3) UUID computed the way the JVM's
/// `UUID.nameUUIDFromBytes` does it: MD5 over the raw UTF-8 bytes of
/// `"OfflinePlayer:" + name`, with the version and variant bits patched.
/// Note there is no namespace prefix, so `Uuid::new_v3` would give a
/// different answer.
///
/// ```rust
/// use gatehold_protocol::offline_uuid;
///
/// let id = offline_uuid("Notch");
/// assert_eq!(id.to_string(), "b50ad385-829d-3141-a216-7e7d7539ba7f");
/// assert_eq!(id.get_version_num(), 3);
/// ```
pub fn offline_uuid(name: &str) -> Uuid {
    let mut hasher = Md5::new();
    hasher.update(OFFLINE_PREFIX.as_bytes());
    hasher.update(name.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hasher.finalize());
    uuid::Builder::from_md5_bytes(bytes).into_uuid()
}

/// The identity of a connecting client.
///
/// `id` is `None` while the profile is incomplete (the client only sent a
/// name). Once the login state machine leaves the authentication phase the
/// identity is frozen; code after that point should treat it as read-only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Unique id. Authoritative only when `verified` is true.
    pub id: Option<Uuid>,

    /// Display name as sent by the client (or corrected by the
    /// authentication service).
    pub name: String,

    /// `true` if the authentication service vouched for this identity.
    #[serde(default)]
    pub verified: bool,
}

impl Identity {
    /// An identity exactly as the client claimed it.
    pub fn claimed(name: impl Into<String>, id: Option<Uuid>) -> Self {
        Self {
            id,
            name: name.into(),
            verified: false,
        }
    }

    /// An identity confirmed by the authentication service.
    pub fn verified(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            verified: true,
        }
    }

    /// The fallback identity for `name`: offline id, never verified.
    pub fn fallback(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: Some(offline_uuid(&name)),
            name,
            verified: false,
        }
    }

    /// Returns `true` if the identity carries both a name and an id.
    pub fn is_complete(&self) -> bool {
        self.id.is_some() && !self.name.is_empty()
    }

    /// Returns the id, or the offline id when the profile is incomplete.
    ///
    /// This is the "canonical" id used to key sessions: a client that only
    /// claimed a name still maps to a stable key.
    pub fn canonical_id(&self) -> Uuid {
        self.id.unwrap_or_else(|| offline_uuid(&self.name))
    }

    /// Returns this identity if complete, otherwise the fallback identity
    /// for the same name.
    pub fn completed(self) -> Self {
        if self.is_complete() {
            self
        } else {
            Self::fallback(self.name)
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} ({id})", self.name),
            None => write!(f, "{} (incomplete)", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_uuid_matches_known_values() {
        // Reference values computed with the JVM's nameUUIDFromBytes.
        assert_eq!(
            offline_uuid("Alice").to_string(),
            "10920508-d5d8-3eed-93d2-92f193afe7d7"
        );
        assert_eq!(
            offline_uuid("Bob").to_string(),
            "faa5dca3-c3d4-354b-ae1b-dde9e5a14b3b"
        );
    }

    #[test]
    fn test_offline_uuid_is_version_three_rfc_variant() {
        let id = offline_uuid("Alice");
        assert_eq!(id.get_version_num(), 3);
        assert_eq!(id.get_variant(), uuid::Variant::RFC4122);
    }

    #[test]
    fn test_offline_uuid_is_case_sensitive() {
        assert_ne!(offline_uuid("alice"), offline_uuid("Alice"));
    }

    #[test]
    fn test_claimed_without_id_is_incomplete() {
        let identity = Identity::claimed("Alice", None);
        assert!(!identity.is_complete());
        assert!(!identity.verified);
    }

    #[test]
    fn test_claimed_with_empty_name_is_incomplete() {
        let identity = Identity::claimed("", Some(Uuid::new_v4()));
        assert!(!identity.is_complete());
    }

    #[test]
    fn test_fallback_uses_offline_uuid() {
        let identity = Identity::fallback("Alice");
        assert_eq!(identity.id, Some(offline_uuid("Alice")));
        assert!(!identity.verified);
        assert!(identity.is_complete());
    }

    #[test]
    fn test_canonical_id_prefers_claimed_id() {
        let id = Uuid::new_v4();
        assert_eq!(Identity::claimed("Alice", Some(id)).canonical_id(), id);
        assert_eq!(
            Identity::claimed("Alice", None).canonical_id(),
            offline_uuid("Alice")
        );
    }

    #[test]
    fn test_completed_keeps_complete_identity() {
        let verified = Identity::verified(Uuid::new_v4(), "Alice");
        assert_eq!(verified.clone().completed(), verified);
    }

    #[test]
    fn test_completed_replaces_incomplete_identity() {
        let completed = Identity::claimed("Alice", None).completed();
        assert_eq!(completed, Identity::fallback("Alice"));
    }

    #[test]
    fn test_display_shows_name_and_id() {
        let incomplete = Identity::claimed("Alice", None);
        assert_eq!(incomplete.to_string(), "Alice (incomplete)");

        let fallback = Identity::fallback("Alice");
        assert_eq!(
            fallback.to_string(),
            "Alice (10920508-d5d8-3eed-93d2-92f193afe7d7)"
        );
    }

    #[test]
    fn test_identity_deserializes_without_verified_flag() {
        let json = r#"{"id":null,"name":"Alice"}"#;
        let identity: Identity = serde_json::from_str(json).unwrap();
        assert_eq!(identity, Identity::claimed("Alice", None));
    }
}
