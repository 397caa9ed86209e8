use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum StorageError {
    /// The space or content item does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("checksum mismatch for {item}: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        item: String,
        expected: String,
        actual: String,
    },

    #[error("space {space_id} was not available after {attempts} attempts")]
    SpaceNotAvailable { space_id: String, attempts: u32 },

    #[error("store not found by the given key: {0}")]
    StoreNotFound(String),

    #[error("invalid id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error(transparent)]
    Storage(#[from] opendal::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Failures of several stores, keyed by store id.
    #[error("failed on {} stores: {}", .0.len(), describe_failures(.0))]
    Multi(BTreeMap<String, StorageError>),

    #[error(transparent)]
    Any(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Any(message.into().into())
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Storage(err) => err.kind() == opendal::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Integrity failures are surfaced immediately and never retried.
    #[must_use]
    pub fn is_checksum_mismatch(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. })
    }

    /// Whether a bounded retry may make progress on this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::NotFound(_)
                | Self::ChecksumMismatch { .. }
                | Self::StoreNotFound(_)
                | Self::InvalidId { .. }
        ) && !self.is_not_found()
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

fn describe_failures(errors: &BTreeMap<String, StorageError>) -> String {
    errors
        .iter()
        .map(|(store_id, err)| format!("[{store_id}] {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_error_lists_every_store() {
        let err = StorageError::Multi(BTreeMap::from([
            ("1".to_string(), StorageError::not_found("content space1/a")),
            ("2".to_string(), StorageError::msg("injected failure in add_content")),
        ]));
        assert_eq!(
            err.to_string(),
            "failed on 2 stores: [1] not found: content space1/a; [2] injected failure in \
             add_content"
        );
    }
}
