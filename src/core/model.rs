// src/core/model.rs

//! The persisted user record and its codec to/from a generic attribute map.
//!
//! The backing document store exchanges whole documents as untyped maps
//! (`serde_json::Map<String, Value>`), the same shape the real store would
//! hand back from a `_source` fetch. Encoding never omits a field -- even an
//! absent optional is written as `null` -- so that round-tripping a decoded
//! record through `encode` reproduces the original document shape.

use serde_json::{Map, Value};
use tracing::trace;

/// A user record as persisted in (and returned from) the backing store.
///
/// The password hash is intentionally excluded from this type: `User` is
/// the shape handed to callers and listeners, and the hash must never leave
/// the store (see [`UserAndPassword`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub roles: Vec<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub metadata: Map<String, Value>,
}

/// The in-memory pair returned by the read path for password verification.
/// Never handed to listeners or logged in full -- only [`UserAndPassword::user`]
/// is ever exposed outside the mutation/read paths.
#[derive(Debug, Clone)]
pub struct UserAndPassword {
    pub user: User,
    pub password_hash: String,
}

impl UserAndPassword {
    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }
}

/// The full record, including the opaque hash, as it is encoded to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub metadata: Map<String, Value>,
}

impl UserRecord {
    pub fn into_user_and_password(self) -> UserAndPassword {
        UserAndPassword {
            user: User {
                username: self.username,
                roles: self.roles,
                full_name: self.full_name,
                email: self.email,
                metadata: self.metadata,
            },
            password_hash: self.password_hash,
        }
    }
}

/// Encodes a record to a generic attribute map suitable for `index(...)`.
///
/// Writes every field, including `null`s for absent optionals, so the
/// document shape is stable across writes -- a partial update would never be
/// issued, only whole-document `index` calls (see `put` in the mutation path).
pub fn encode(record: &UserRecord) -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert("username".into(), Value::String(record.username.clone()));
    doc.insert(
        "password_hash".into(),
        Value::String(record.password_hash.clone()),
    );
    doc.insert(
        "roles".into(),
        Value::Array(record.roles.iter().cloned().map(Value::String).collect()),
    );
    doc.insert(
        "full_name".into(),
        record.full_name.clone().map(Value::String).unwrap_or(Value::Null),
    );
    doc.insert(
        "email".into(),
        record.email.clone().map(Value::String).unwrap_or(Value::Null),
    );
    doc.insert("metadata".into(), Value::Object(record.metadata.clone()));
    doc
}

/// Decodes a document into a `UserRecord`. Requires `password_hash` and
/// `roles`; `full_name`, `email`, and `metadata` may be absent or null.
///
/// Any decode failure -- a missing required field, or `roles` containing a
/// non-string element -- is logged and skipped by the caller, never
/// surfaced as an error. This function itself just returns `None`.
pub fn decode(username: &str, doc: &Map<String, Value>) -> Option<UserRecord> {
    let password_hash = match doc.get("password_hash").and_then(Value::as_str) {
        Some(h) => h.to_string(),
        None => {
            trace!(username, "skipping record: missing or non-string password_hash");
            return None;
        }
    };

    let roles = match doc.get("roles").and_then(Value::as_array) {
        Some(arr) => {
            let mut roles = Vec::with_capacity(arr.len());
            for v in arr {
                match v.as_str() {
                    Some(s) => roles.push(s.to_string()),
                    None => {
                        trace!(username, "skipping record: non-string entry in roles");
                        return None;
                    }
                }
            }
            roles
        }
        None => {
            trace!(username, "skipping record: missing or non-array roles");
            return None;
        }
    };

    let full_name = doc
        .get("full_name")
        .and_then(|v| if v.is_null() { None } else { v.as_str() })
        .map(str::to_string);
    let email = doc
        .get("email")
        .and_then(|v| if v.is_null() { None } else { v.as_str() })
        .map(str::to_string);
    let metadata = doc
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Some(UserRecord {
        username: username.to_string(),
        password_hash,
        roles,
        full_name,
        email,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UserRecord {
        UserRecord {
            username: "alice".into(),
            password_hash: "H1".into(),
            roles: vec!["admin".into(), "ops".into()],
            full_name: Some("Alice Liddell".into()),
            email: None,
            metadata: {
                let mut m = Map::new();
                m.insert("department".into(), Value::String("platform".into()));
                m
            },
        }
    }

    #[test]
    fn round_trips_a_well_formed_record() {
        let record = sample();
        let doc = encode(&record);
        let decoded = decode(&record.username, &doc).expect("should decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn round_trips_a_record_with_no_optionals() {
        let record = UserRecord {
            username: "bob".into(),
            password_hash: "H2".into(),
            roles: vec![],
            full_name: None,
            email: None,
            metadata: Map::new(),
        };
        let doc = encode(&record);
        assert_eq!(doc.get("full_name"), Some(&Value::Null));
        let decoded = decode(&record.username, &doc).expect("should decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn decode_fails_when_password_hash_missing() {
        let mut doc = Map::new();
        doc.insert(
            "roles".into(),
            Value::Array(vec![Value::String("admin".into())]),
        );
        assert!(decode("alice", &doc).is_none());
    }

    #[test]
    fn decode_fails_when_roles_missing() {
        let mut doc = Map::new();
        doc.insert("password_hash".into(), Value::String("H1".into()));
        assert!(decode("alice", &doc).is_none());
    }

    #[test]
    fn decode_fails_when_roles_entry_is_not_a_string() {
        let mut doc = Map::new();
        doc.insert("password_hash".into(), Value::String("H1".into()));
        doc.insert(
            "roles".into(),
            Value::Array(vec![Value::Number(1.into())]),
        );
        assert!(decode("alice", &doc).is_none());
    }

    #[test]
    fn encode_never_includes_the_password_hash_under_a_loggable_field() {
        // The hash must be present (it's part of the persisted document) but
        // this test documents the one field callers must be careful never to
        // pass to a logging macro.
        let doc = encode(&sample());
        assert!(doc.contains_key("password_hash"));
    }
}
