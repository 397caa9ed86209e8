//! # Storage Model
//!
//! Spaces, content items, access types, ACLs and the metadata property names
//! every provider reports.
use std::{collections::BTreeMap, fmt, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{stream::BytesStream, StorageError, StorageResult};

/// Key/value metadata attached to spaces and content items.
pub type Metadata = BTreeMap<String, String>;

pub const METADATA_SPACE_CREATED: &str = "space-created";
pub const METADATA_SPACE_COUNT: &str = "space-count";
pub const METADATA_SPACE_ACCESS: &str = "space-access";

pub const METADATA_CONTENT_MIMETYPE: &str = "content-mimetype";
pub const METADATA_CONTENT_SIZE: &str = "content-size";
pub const METADATA_CONTENT_MODIFIED: &str = "content-modified";
pub const METADATA_CONTENT_CHECKSUM: &str = "content-checksum";

/// Prefix of the space metadata entries that expose ACL grants, followed by
/// the principal name.
pub const PROPERTIES_SPACE_ACL: &str = "acl-";

pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// Content metadata keys owned by the provider. Callers can read them but an
/// update through `set_content_metadata` never removes them.
pub const SYSTEM_CONTENT_METADATA: &[&str] = &[
    METADATA_CONTENT_MIMETYPE,
    METADATA_CONTENT_SIZE,
    METADATA_CONTENT_MODIFIED,
    METADATA_CONTENT_CHECKSUM,
];

/// Space metadata keys owned by the provider.
pub const SYSTEM_SPACE_METADATA: &[&str] = &[
    METADATA_SPACE_CREATED,
    METADATA_SPACE_COUNT,
    METADATA_SPACE_ACCESS,
];

const MAX_CONTENT_ID_BYTES: usize = 1024;

lazy_static! {
    static ref SPACE_ID_RE: Regex = Regex::new(r"^[a-z][a-z0-9.-]{1,40}[a-z0-9.]$").unwrap();
}

/// Anonymous read access to a space.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum AccessType {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "CLOSED")]
    #[default]
    Closed,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("OPEN"),
            Self::Closed => f.write_str("CLOSED"),
        }
    }
}

impl FromStr for AccessType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => Err(StorageError::msg(format!("unknown access type: {other}"))),
        }
    }
}

/// A grant given to a principal on a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
pub enum AclPermission {
    #[serde(rename = "READ")]
    Read,
    #[serde(rename = "WRITE")]
    Write,
}

impl fmt::Display for AclPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("READ"),
            Self::Write => f.write_str("WRITE"),
        }
    }
}

impl FromStr for AclPermission {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(Self::Read),
            "WRITE" => Ok(Self::Write),
            other => Err(StorageError::msg(format!("unknown acl permission: {other}"))),
        }
    }
}

/// Principal to grant mapping of a space.
pub type SpaceAcls = BTreeMap<String, AclPermission>;

/// A content item as returned by `get_content`.
pub struct Content {
    pub id: String,
    pub metadata: Metadata,
    pub stream: BytesStream,
}

impl Content {
    #[must_use]
    pub fn mimetype(&self) -> Option<&str> {
        self.metadata
            .get(METADATA_CONTENT_MIMETYPE)
            .map(String::as_str)
    }

    #[must_use]
    pub fn checksum(&self) -> Option<&str> {
        self.metadata
            .get(METADATA_CONTENT_CHECKSUM)
            .map(String::as_str)
    }

    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.metadata
            .get(METADATA_CONTENT_SIZE)
            .and_then(|s| s.parse().ok())
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Lower-cases all keys. Later duplicates (by case) win.
#[must_use]
pub fn normalize_keys(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect()
}

/// The part of content metadata a caller owns, with system keys removed.
#[must_use]
pub fn user_metadata(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .filter(|(k, _)| !SYSTEM_CONTENT_METADATA.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// The caller-owned part of space metadata: system keys and ACL entries
/// removed.
#[must_use]
pub fn space_user_metadata(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .filter(|(k, _)| {
            !SYSTEM_SPACE_METADATA.contains(&k.as_str()) && !k.starts_with(PROPERTIES_SPACE_ACL)
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Space metadata entries for the given ACLs.
#[must_use]
pub fn acls_to_metadata(acls: &SpaceAcls) -> Metadata {
    acls.iter()
        .map(|(principal, perm)| (format!("{PROPERTIES_SPACE_ACL}{principal}"), perm.to_string()))
        .collect()
}

/// Checks a space id is usable as a bucket-style name.
///
/// # Errors
///
/// Returns [`StorageError::InvalidId`] with the failing rule.
pub fn validate_space_id(space_id: &str) -> StorageResult<()> {
    let invalid = |reason: &str| {
        Err(StorageError::InvalidId {
            id: space_id.to_string(),
            reason: reason.to_string(),
        })
    };

    if !SPACE_ID_RE.is_match(space_id) {
        return invalid(
            "must be 3-42 characters of lower case letters, digits, '.' or '-' and start with a letter",
        );
    }
    if space_id.ends_with('-') {
        return invalid("must not end with '-'");
    }
    if space_id.contains("..") || space_id.contains("-.") || space_id.contains(".-") {
        return invalid("must not contain '..', '-.' or '.-'");
    }
    Ok(())
}

/// Checks a content id can be stored by every provider.
///
/// # Errors
///
/// Returns [`StorageError::InvalidId`] with the failing rule.
pub fn validate_content_id(content_id: &str) -> StorageResult<()> {
    let invalid = |reason: &str| {
        Err(StorageError::InvalidId {
            id: content_id.to_string(),
            reason: reason.to_string(),
        })
    };

    if content_id.is_empty() {
        return invalid("must not be empty");
    }
    if content_id.len() > MAX_CONTENT_ID_BYTES {
        return invalid("must be at most 1024 bytes");
    }
    if content_id.starts_with('/') {
        return invalid("must not start with '/'");
    }
    if content_id.contains('?') || content_id.chars().any(char::is_control) {
        return invalid("must not contain '?' or control characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("space1", true)]
    #[case("my.space-2", true)]
    #[case("ab", false)]
    #[case("1space", false)]
    #[case("Space", false)]
    #[case("space-", false)]
    #[case("spa..ce", false)]
    #[case("spa-.ce", false)]
    fn can_validate_space_ids(#[case] id: &str, #[case] valid: bool) {
        assert_eq!(validate_space_id(id).is_ok(), valid);
    }

    #[rstest]
    #[case("a/b/c.txt", true)]
    #[case("", false)]
    #[case("/leading", false)]
    #[case("what?", false)]
    fn can_validate_content_ids(#[case] id: &str, #[case] valid: bool) {
        assert_eq!(validate_content_id(id).is_ok(), valid);
    }

    #[test]
    fn user_metadata_drops_system_keys() {
        let metadata = Metadata::from([
            (METADATA_CONTENT_MIMETYPE.to_string(), "text/plain".to_string()),
            (METADATA_CONTENT_CHECKSUM.to_string(), "abc".to_string()),
            ("color".to_string(), "green".to_string()),
        ]);
        assert_eq!(
            user_metadata(&metadata),
            Metadata::from([("color".to_string(), "green".to_string())])
        );
    }

    #[test]
    fn normalize_keys_lower_cases() {
        let metadata = Metadata::from([("Color".to_string(), "green".to_string())]);
        assert_eq!(normalize_keys(&metadata).get("color").unwrap(), "green");
    }

    #[test]
    fn access_type_parses_case_insensitive() {
        assert_eq!("open".parse::<AccessType>().unwrap(), AccessType::Open);
        assert_eq!(AccessType::default(), AccessType::Closed);
        assert!("public".parse::<AccessType>().is_err());
    }
}
