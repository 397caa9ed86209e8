//! # Duplication
//!
//! Mirrors spaces and content from the primary store to secondary stores.
//!
//! Change events reach [`DuplicationService`], which looks up the
//! destination stores configured for the space in a [`DuplicationConfig`]
//! and runs the matching [`SpaceDuplicator`] or [`ContentDuplicator`]
//! operation for each destination. Every mirrored operation is idempotent:
//! replaying an event after a failure re-uploads content and rewrites
//! metadata.
mod config;
mod content;
mod service;
mod space;

use serde::{Deserialize, Serialize};

pub use self::{
    config::{DuplicationConfig, NEW_SPACE_DEFAULT, SPACE_PREFIX},
    content::{ContentDuplicator, StoreContentDuplicator},
    service::{DuplicationMessage, DuplicationService, DuplicationTopic},
    space::{SpaceDuplicator, StoreSpaceDuplicator},
};
use crate::storage::retry::Retrier;

fn create_retry() -> Retrier {
    Retrier::default()
}

fn update_retry() -> Retrier {
    Retrier::default()
}

fn delete_retry() -> Retrier {
    Retrier {
        attempts: 5,
        ..Retrier::default()
    }
}

/// Retry policy per family of destination operations.
///
/// Deletes get more attempts since a lingering item on a secondary store is
/// only cleaned up by the next delete event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DuplicationRetry {
    #[serde(default = "create_retry")]
    pub create: Retrier,
    #[serde(default = "update_retry")]
    pub update: Retrier,
    #[serde(default = "delete_retry")]
    pub delete: Retrier,
}

impl Default for DuplicationRetry {
    fn default() -> Self {
        Self {
            create: create_retry(),
            update: update_retry(),
            delete: delete_retry(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults_per_operation_family() {
        let retry = DuplicationRetry::default();
        assert_eq!(retry.create, Retrier::new(3, Duration::from_secs(1)));
        assert_eq!(retry.update, Retrier::new(3, Duration::from_secs(1)));
        assert_eq!(retry.delete, Retrier::new(5, Duration::from_secs(1)));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let retry: DuplicationRetry =
            serde_yaml::from_str("update:\n  attempts: 1\n  delay_ms: 0\n").unwrap();
        assert_eq!(retry.update, Retrier::new(1, Duration::ZERO));
        assert_eq!(retry.delete, DuplicationRetry::default().delete);
    }
}
