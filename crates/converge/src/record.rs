//! Store key scheme and record encoding
//!
//! Keys are `<kind>@<id>`; values are JSON objects carrying a `schema` tag
//! (`user/v1`, `group/v1`) next to the record fields. Decoding ignores
//! fields it does not know and fills missing lists with empty ones, so a
//! record written by a newer schema revision stays readable.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{GroupRecord, UserRecord};

/// Key prefix of group records
pub const GROUP_PREFIX: &str = "group@";

/// Key prefix of user records
pub const USER_PREFIX: &str = "user@";

/// Entity namespace within the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Group,
    User,
}

impl Namespace {
    /// Key prefix for this namespace, including the `@`
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Group => GROUP_PREFIX,
            Namespace::User => USER_PREFIX,
        }
    }

    fn schema(self) -> &'static str {
        match self {
            Namespace::Group => "group/v1",
            Namespace::User => "user/v1",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "schema")]
enum StoredRecord {
    #[serde(rename = "group/v1")]
    Group(GroupRecord),
    #[serde(rename = "user/v1")]
    User(UserRecord),
}

impl StoredRecord {
    fn schema(&self) -> &'static str {
        match self {
            StoredRecord::Group(_) => Namespace::Group.schema(),
            StoredRecord::User(_) => Namespace::User.schema(),
        }
    }
}

/// Reject ids that cannot name an account or a key
///
/// Ids must be non-empty, free of `@`, `/`, whitespace and control
/// characters, and not `.` or `..`.
pub fn validate_id(id: &str) -> Result<()> {
    let bad_char = id
        .chars()
        .any(|c| c == '@' || c == '/' || c.is_whitespace() || c.is_control());
    if id.is_empty() || bad_char || id == "." || id == ".." {
        return Err(Error::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Build the store key for an id
pub fn key(namespace: Namespace, id: &str) -> Result<String> {
    validate_id(id)?;
    Ok(format!("{}{}", namespace.prefix(), id))
}

/// Build the store key for a group
pub fn group_key(id: &str) -> Result<String> {
    key(Namespace::Group, id)
}

/// Build the store key for a user
pub fn user_key(id: &str) -> Result<String> {
    key(Namespace::User, id)
}

/// Split a key into its namespace and id
///
/// The key must contain exactly one `@`, a known namespace before it and a
/// non-empty id after it.
pub fn parse_key(key: &str) -> Result<(Namespace, &str)> {
    let invalid = || Error::InvalidKey(key.to_string());

    let mut parts = key.split('@');
    let (Some(kind), Some(id), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if id.is_empty() {
        return Err(invalid());
    }

    let namespace = match kind {
        "group" => Namespace::Group,
        "user" => Namespace::User,
        _ => return Err(invalid()),
    };
    Ok((namespace, id))
}

/// Parse a key that must belong to `namespace`
pub fn parse_key_in(namespace: Namespace, key: &str) -> Result<&str> {
    match parse_key(key)? {
        (found, id) if found == namespace => Ok(id),
        _ => Err(Error::InvalidKey(key.to_string())),
    }
}

fn encode(record: &StoredRecord) -> Result<Vec<u8>> {
    serde_json::to_vec(record).map_err(|source| Error::Decode {
        context: format!("{} record", record.schema()),
        source,
    })
}

fn decode(key: &str, bytes: &[u8]) -> Result<StoredRecord> {
    serde_json::from_slice(bytes).map_err(|source| Error::Decode {
        context: format!("record {key}"),
        source,
    })
}

/// Serialize a user record
pub fn encode_user(record: &UserRecord) -> Result<Vec<u8>> {
    encode(&StoredRecord::User(record.clone()))
}

/// Serialize a group record
pub fn encode_group(record: &GroupRecord) -> Result<Vec<u8>> {
    encode(&StoredRecord::Group(record.clone()))
}

/// Deserialize the user record stored under `key`
pub fn decode_user(key: &str, bytes: &[u8]) -> Result<UserRecord> {
    match decode(key, bytes)? {
        StoredRecord::User(record) => Ok(record),
        other => Err(Error::SchemaMismatch {
            key: key.to_string(),
            expected: Namespace::User.schema(),
            found: other.schema(),
        }),
    }
}

/// Deserialize the group record stored under `key`
pub fn decode_group(key: &str, bytes: &[u8]) -> Result<GroupRecord> {
    match decode(key, bytes)? {
        StoredRecord::Group(record) => Ok(record),
        other => Err(Error::SchemaMismatch {
            key: key.to_string(),
            expected: Namespace::Group.schema(),
            found: other.schema(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_user_record_roundtrip() {
        let cases = [
            UserRecord {
                id: "user1".into(),
                groups: strings(&["a", "b", "c"]),
                ssh_keys: strings(&["M", "N", "O"]),
                shell: "shell1".into(),
            },
            UserRecord {
                id: "user2".into(),
                groups: Vec::new(),
                ssh_keys: strings(&["ssh-ed25519 AAAA user2@laptop"]),
                shell: "/bin/zsh".into(),
            },
            UserRecord {
                id: "user3".into(),
                groups: strings(&["dev"]),
                ssh_keys: Vec::new(),
                shell: String::new(),
            },
            UserRecord {
                id: "user4".into(),
                ..Default::default()
            },
        ];

        for record in cases {
            let bytes = encode_user(&record).unwrap();
            let decoded = decode_user("user@x", &bytes).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn test_group_record_is_tagged() {
        let bytes = encode_group(&GroupRecord { id: "dev".into() }).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["schema"], "group/v1");
        assert_eq!(value["id"], "dev");
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let bytes = br#"{"schema":"user/v1","id":"alice","groups":["dev"],"uid":1001,"expires":null}"#;
        let record = decode_user("user@alice", bytes).unwrap();
        assert_eq!(record.id, "alice");
        assert_eq!(record.groups, vec!["dev"]);
        assert!(record.ssh_keys.is_empty());
    }

    #[test]
    fn test_decode_schema_mismatch() {
        let bytes = encode_group(&GroupRecord { id: "dev".into() }).unwrap();
        let err = decode_user("user@dev", &bytes).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_group("group@dev", b"\x00\x01garbage"),
            Err(Error::Decode { .. })
        ));
        assert!(matches!(
            decode_group("group@dev", br#"{"schema":"group/v9","id":"dev"}"#),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("user@12345").unwrap(), (Namespace::User, "12345"));
        assert_eq!(parse_key("group@dev").unwrap(), (Namespace::Group, "dev"));
    }

    #[test]
    fn test_parse_key_rejects_malformed() {
        for key in ["", "test123", "test123@test@test1", "user@", "host@alice"] {
            assert!(
                matches!(parse_key(key), Err(Error::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_key_in_namespace() {
        assert_eq!(parse_key_in(Namespace::User, "user@bob").unwrap(), "bob");
        assert!(parse_key_in(Namespace::Group, "user@bob").is_err());
    }

    #[test]
    fn test_key_validation() {
        assert_eq!(user_key("alice").unwrap(), "user@alice");
        assert_eq!(group_key("dev-ops_2").unwrap(), "group@dev-ops_2");
        for bad in ["", "a@b", "../etc", "..", "two words", "tab\t"] {
            assert!(matches!(user_key(bad), Err(Error::InvalidId(_))), "{bad:?}");
        }
    }
}
