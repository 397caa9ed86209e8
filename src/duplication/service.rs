//! # Duplication Service
//!
//! Dispatches change events to the duplicators of every destination store
//! configured for the event's space.
//!
//! * A space with an explicit entry goes to the stores of that entry.
//! * A `space-create` event for any other space goes to the new-space
//!   default stores, and the space keeps going there for later events.
//! * Events of every other space are dropped.
//!
//! Destinations run concurrently. Operations on one destination run one at a
//! time. A failing destination does not stop the others. A single failure is
//! returned as is, several come back together as [`StorageError::Multi`].
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
    sync::{Arc, PoisonError, RwLock},
};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    ContentDuplicator, DuplicationConfig, DuplicationRetry, SpaceDuplicator,
    StoreContentDuplicator, StoreSpaceDuplicator,
};
use crate::storage::{broker::StorageProviderFactory, StorageError, StorageProvider, StorageResult};

/// Kinds of change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicationTopic {
    SpaceCreate,
    SpaceUpdate,
    SpaceUpdateAcl,
    SpaceDelete,
    ContentCreate,
    /// Handled as [`DuplicationTopic::ContentCreate`].
    ContentCopy,
    ContentUpdate,
    ContentDelete,
}

impl DuplicationTopic {
    pub const ALL: [Self; 8] = [
        Self::SpaceCreate,
        Self::SpaceUpdate,
        Self::SpaceUpdateAcl,
        Self::SpaceDelete,
        Self::ContentCreate,
        Self::ContentCopy,
        Self::ContentUpdate,
        Self::ContentDelete,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SpaceCreate => "space-create",
            Self::SpaceUpdate => "space-update",
            Self::SpaceUpdateAcl => "space-update-acl",
            Self::SpaceDelete => "space-delete",
            Self::ContentCreate => "content-create",
            Self::ContentCopy => "content-copy",
            Self::ContentUpdate => "content-update",
            Self::ContentDelete => "content-delete",
        }
    }

    /// Whether events of this topic name a content item.
    #[must_use]
    pub fn is_content(self) -> bool {
        matches!(
            self,
            Self::ContentCreate | Self::ContentCopy | Self::ContentUpdate | Self::ContentDelete
        )
    }
}

impl fmt::Display for DuplicationTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicationTopic {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| StorageError::msg(format!("unknown duplication topic: {s}")))
    }
}

/// A change event as delivered by the notification source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DuplicationMessage {
    pub topic: DuplicationTopic,
    pub space_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

impl DuplicationMessage {
    /// # Errors
    ///
    /// Returns [`StorageError::Json`] for a malformed message.
    pub fn from_json(message: &str) -> StorageResult<Self> {
        Ok(serde_json::from_str(message)?)
    }
}

struct Destination {
    space: Arc<dyn SpaceDuplicator>,
    content: Arc<dyn ContentDuplicator>,
    lock: Mutex<()>,
}

pub struct DuplicationService {
    config: RwLock<Arc<DuplicationConfig>>,
    promoted: RwLock<BTreeSet<String>>,
    destinations: BTreeMap<String, Destination>,
}

impl DuplicationService {
    /// A service without destinations. Add them with
    /// [`Self::with_destination`].
    #[must_use]
    pub fn new(config: DuplicationConfig) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            promoted: RwLock::default(),
            destinations: BTreeMap::new(),
        }
    }

    /// Duplicates from the primary store to every other configured store.
    ///
    /// # Errors
    ///
    /// Returns an error when a store of the factory cannot be resolved.
    pub fn from_factory(
        factory: &StorageProviderFactory,
        config: DuplicationConfig,
        retry: &DuplicationRetry,
    ) -> StorageResult<Self> {
        let from: Arc<dyn StorageProvider> = Arc::new(factory.get_storage_provider(None)?);
        let mut service = Self::new(config);
        for account in factory.get_storage_accounts() {
            if account.primary {
                continue;
            }
            let to: Arc<dyn StorageProvider> =
                Arc::new(factory.get_storage_provider(Some(&account.id))?);
            service = service.with_destination(
                &account.id,
                Arc::new(StoreSpaceDuplicator::new(
                    from.clone(),
                    to.clone(),
                    retry.clone(),
                )),
                Arc::new(StoreContentDuplicator::new(from.clone(), to, retry.clone())),
            );
        }
        Ok(service)
    }

    #[must_use]
    pub fn with_destination(
        mut self,
        store_id: &str,
        space: Arc<dyn SpaceDuplicator>,
        content: Arc<dyn ContentDuplicator>,
    ) -> Self {
        self.destinations.insert(
            store_id.to_string(),
            Destination {
                space,
                content,
                lock: Mutex::new(()),
            },
        );
        self
    }

    /// The current mapping.
    #[must_use]
    pub fn config(&self) -> Arc<DuplicationConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the mapping. Spaces picked up through the new-space default
    /// stay registered and follow the new default list, unless the new
    /// mapping has an explicit entry for them.
    pub fn reload(&self, config: DuplicationConfig) {
        info!(
            spaces = config.spaces().count(),
            new_space_default = ?config.new_space_default(),
            "reloading duplication mapping"
        );
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

    /// Spaces registered through the new-space default.
    #[must_use]
    pub fn promoted_spaces(&self) -> Vec<String> {
        self.promoted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Destination store ids of an event. A `space-create` event of an
    /// unseen space registers it under the new-space default.
    fn resolve(&self, topic: DuplicationTopic, space_id: &str) -> Vec<String> {
        let config = self.config();
        if let Some(stores) = config.space_destinations(space_id) {
            return stores.to_vec();
        }

        let default = config.new_space_default();
        if default.is_empty() {
            return Vec::new();
        }
        let mut promoted = self
            .promoted
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if promoted.contains(space_id) {
            return default.to_vec();
        }
        if topic == DuplicationTopic::SpaceCreate {
            info!(space_id, stores = ?default, "duplicating new space to default stores");
            promoted.insert(space_id.to_string());
            return default.to_vec();
        }
        Vec::new()
    }

    /// Mirrors one change event to every destination of its space.
    ///
    /// # Errors
    ///
    /// Returns the error of a single failed destination unchanged, or
    /// [`StorageError::Multi`] with the error of every failed
    /// destination, or an error when a content topic has no content id.
    pub async fn process_duplication(
        &self,
        topic: DuplicationTopic,
        space_id: &str,
        content_id: Option<&str>,
    ) -> StorageResult<()> {
        let content_id = match (topic.is_content(), content_id) {
            (true, None) => {
                return Err(StorageError::msg(format!(
                    "{topic} event for space {space_id} has no content id"
                )))
            }
            (true, content_id) => content_id,
            (false, _) => None,
        };

        let stores = self.resolve(topic, space_id);
        if stores.is_empty() {
            debug!(%topic, space_id, "space is not duplicated, dropping event");
            return Ok(());
        }

        let results = join_all(
            stores
                .iter()
                .map(|store_id| self.duplicate_to(store_id, topic, space_id, content_id)),
        )
        .await;

        if topic == DuplicationTopic::SpaceDelete {
            self.promoted
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(space_id);
        }

        let mut errors = stores
            .into_iter()
            .zip(results)
            .filter_map(|(store_id, result)| result.err().map(|err| (store_id, err)))
            .collect::<BTreeMap<_, _>>();
        if errors.len() > 1 {
            return Err(StorageError::Multi(errors));
        }
        errors.pop_first().map_or(Ok(()), |(_, err)| Err(err))
    }

    /// # Errors
    ///
    /// See [`Self::process_duplication`].
    pub async fn handle_duplication_message(
        &self,
        message: &DuplicationMessage,
    ) -> StorageResult<()> {
        self.process_duplication(
            message.topic,
            &message.space_id,
            message.content_id.as_deref(),
        )
        .await
    }

    async fn duplicate_to(
        &self,
        store_id: &str,
        topic: DuplicationTopic,
        space_id: &str,
        content_id: Option<&str>,
    ) -> StorageResult<()> {
        let Some(destination) = self.destinations.get(store_id) else {
            warn!(store_id, %topic, space_id, "no duplicator for destination store");
            return Ok(());
        };
        let _guard = destination.lock.lock().await;
        let content_id = content_id.unwrap_or_default();

        let result = match topic {
            DuplicationTopic::SpaceCreate => destination.space.create_space(space_id).await,
            DuplicationTopic::SpaceUpdate => destination.space.update_space(space_id).await,
            DuplicationTopic::SpaceUpdateAcl => {
                destination.space.update_space_acl(space_id).await
            }
            DuplicationTopic::SpaceDelete => destination.space.delete_space(space_id).await,
            DuplicationTopic::ContentCreate | DuplicationTopic::ContentCopy => destination
                .content
                .create_content(space_id, content_id)
                .await
                .map(|_| ()),
            DuplicationTopic::ContentUpdate => {
                destination.content.update_content(space_id, content_id).await
            }
            DuplicationTopic::ContentDelete => {
                destination.content.delete_content(space_id, content_id).await
            }
        };

        if let Err(err) = &result {
            error!(store_id, %topic, space_id, content_id, error = %err, "duplication failed");
        }
        result
    }
}
