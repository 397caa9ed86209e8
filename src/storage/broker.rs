//! # Storage Broker
//!
//! [`StorageProviderFactory`] owns one provider per configured account and
//! hands out [`BrokeredStorageProvider`] handles by store id. Every provider
//! it holds is a raw driver wrapped in a
//! [`super::stateless::StatelessStorageProvider`].
use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use tracing::{debug_span, Instrument, Span};

use super::{
    model::{AccessType, Content, Metadata, SpaceAcls},
    provider::{ContentIdStream, StorageProvider},
    stateless::{StatelessConfig, StatelessStorageProvider},
    stream::BytesStream,
    drivers, StorageError, StorageResult,
};
use crate::config::{self, Account};

struct Store {
    account: Account,
    provider: Arc<dyn StorageProvider>,
}

pub struct StorageProviderFactory {
    stores: Vec<Store>,
    primary: String,
}

impl StorageProviderFactory {
    /// Builds a driver for every configured account.
    ///
    /// # Errors
    ///
    /// Returns an error when a driver cannot be built or the accounts do not
    /// name exactly one primary.
    pub fn from_config(
        storage: &config::Storage,
        stateless: &StatelessConfig,
    ) -> StorageResult<Self> {
        let stores = storage
            .accounts
            .iter()
            .map(|account| {
                let driver: Arc<dyn StorageProvider> =
                    Arc::from(drivers::from_account(account, stateless.algorithm)?);
                Ok((account.clone(), driver))
            })
            .collect::<StorageResult<Vec<_>>>()?;
        Self::new(stores, stateless)
    }

    /// Builds the factory from accounts and their raw drivers.
    ///
    /// # Errors
    ///
    /// Returns an error when two accounts share an id or the accounts do not
    /// name exactly one primary.
    pub fn new(
        stores: Vec<(Account, Arc<dyn StorageProvider>)>,
        stateless: &StatelessConfig,
    ) -> StorageResult<Self> {
        let mut seen = BTreeSet::new();
        for (account, _) in &stores {
            if !seen.insert(account.id.as_str()) {
                return Err(StorageError::msg(format!(
                    "storage account '{}' is configured more than once",
                    account.id
                )));
            }
        }

        let primaries = stores
            .iter()
            .filter(|(account, _)| account.primary)
            .map(|(account, _)| account.id.clone())
            .collect::<Vec<_>>();
        let primary = match primaries.as_slice() {
            [primary] => primary.clone(),
            [] => return Err(StorageError::msg("no primary storage account configured")),
            _ => {
                return Err(StorageError::msg(format!(
                    "more than one primary storage account configured: {}",
                    primaries.join(", ")
                )))
            }
        };

        let stores = stores
            .into_iter()
            .map(|(account, driver)| Store {
                account,
                provider: Arc::new(StatelessStorageProvider::new(driver, stateless.clone())),
            })
            .collect();

        Ok(Self { stores, primary })
    }

    /// Provider of the given store, or of the primary store when `store_id`
    /// is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::StoreNotFound`] when no account has the given
    /// id.
    pub fn get_storage_provider(
        &self,
        store_id: Option<&str>,
    ) -> StorageResult<BrokeredStorageProvider> {
        let store_id = store_id.unwrap_or(&self.primary);
        self.stores
            .iter()
            .find(|store| store.account.id == store_id)
            .map(|store| BrokeredStorageProvider {
                store_id: store.account.id.clone(),
                target: store.provider.clone(),
            })
            .ok_or_else(|| StorageError::StoreNotFound(store_id.to_string()))
    }

    /// Configured accounts, in configuration order.
    #[must_use]
    pub fn get_storage_accounts(&self) -> Vec<&Account> {
        self.stores.iter().map(|store| &store.account).collect()
    }

    #[must_use]
    pub fn primary_store_id(&self) -> &str {
        &self.primary
    }
}

/// A provider bound to one store id.
#[derive(Clone)]
pub struct BrokeredStorageProvider {
    store_id: String,
    target: Arc<dyn StorageProvider>,
}

impl BrokeredStorageProvider {
    #[must_use]
    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    fn span(&self, operation: &'static str) -> Span {
        debug_span!("storage", store_id = %self.store_id, operation)
    }
}

impl std::fmt::Debug for BrokeredStorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokeredStorageProvider")
            .field("store_id", &self.store_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StorageProvider for BrokeredStorageProvider {
    async fn get_spaces(&self) -> StorageResult<Vec<String>> {
        self.target
            .get_spaces()
            .instrument(self.span("get_spaces"))
            .await
    }

    async fn get_space_contents_chunk(
        &self,
        space_id: &str,
        prefix: Option<&str>,
        max_results: usize,
        marker: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        self.target
            .get_space_contents_chunk(space_id, prefix, max_results, marker)
            .instrument(self.span("get_space_contents_chunk"))
            .await
    }

    fn get_space_contents<'a>(
        &'a self,
        space_id: &'a str,
        prefix: Option<&'a str>,
    ) -> ContentIdStream<'a> {
        self.target.get_space_contents(space_id, prefix)
    }

    async fn create_space(&self, space_id: &str) -> StorageResult<()> {
        self.target
            .create_space(space_id)
            .instrument(self.span("create_space"))
            .await
    }

    async fn delete_space(&self, space_id: &str) -> StorageResult<()> {
        self.target
            .delete_space(space_id)
            .instrument(self.span("delete_space"))
            .await
    }

    async fn space_exists(&self, space_id: &str) -> StorageResult<bool> {
        self.target
            .space_exists(space_id)
            .instrument(self.span("space_exists"))
            .await
    }

    async fn get_space_metadata(&self, space_id: &str) -> StorageResult<Metadata> {
        self.target
            .get_space_metadata(space_id)
            .instrument(self.span("get_space_metadata"))
            .await
    }

    async fn set_space_metadata(&self, space_id: &str, metadata: &Metadata) -> StorageResult<()> {
        self.target
            .set_space_metadata(space_id, metadata)
            .instrument(self.span("set_space_metadata"))
            .await
    }

    async fn get_space_access(&self, space_id: &str) -> StorageResult<AccessType> {
        self.target
            .get_space_access(space_id)
            .instrument(self.span("get_space_access"))
            .await
    }

    async fn set_space_access(&self, space_id: &str, access: AccessType) -> StorageResult<()> {
        self.target
            .set_space_access(space_id, access)
            .instrument(self.span("set_space_access"))
            .await
    }

    async fn get_space_acls(&self, space_id: &str) -> StorageResult<SpaceAcls> {
        self.target
            .get_space_acls(space_id)
            .instrument(self.span("get_space_acls"))
            .await
    }

    async fn set_space_acls(&self, space_id: &str, acls: &SpaceAcls) -> StorageResult<()> {
        self.target
            .set_space_acls(space_id, acls)
            .instrument(self.span("set_space_acls"))
            .await
    }

    async fn add_content(
        &self,
        space_id: &str,
        content_id: &str,
        mimetype: Option<&str>,
        metadata: Option<&Metadata>,
        size: Option<u64>,
        checksum: Option<&str>,
        stream: BytesStream,
    ) -> StorageResult<String> {
        self.target
            .add_content(
                space_id, content_id, mimetype, metadata, size, checksum, stream,
            )
            .instrument(self.span("add_content"))
            .await
    }

    async fn get_content(&self, space_id: &str, content_id: &str) -> StorageResult<Content> {
        self.target
            .get_content(space_id, content_id)
            .instrument(self.span("get_content"))
            .await
    }

    async fn copy_content(
        &self,
        source_space_id: &str,
        source_content_id: &str,
        dest_space_id: &str,
        dest_content_id: &str,
    ) -> StorageResult<String> {
        self.target
            .copy_content(
                source_space_id,
                source_content_id,
                dest_space_id,
                dest_content_id,
            )
            .instrument(self.span("copy_content"))
            .await
    }

    async fn delete_content(&self, space_id: &str, content_id: &str) -> StorageResult<()> {
        self.target
            .delete_content(space_id, content_id)
            .instrument(self.span("delete_content"))
            .await
    }

    async fn get_content_metadata(
        &self,
        space_id: &str,
        content_id: &str,
    ) -> StorageResult<Metadata> {
        self.target
            .get_content_metadata(space_id, content_id)
            .instrument(self.span("get_content_metadata"))
            .await
    }

    async fn set_content_metadata(
        &self,
        space_id: &str,
        content_id: &str,
        metadata: &Metadata,
    ) -> StorageResult<()> {
        self.target
            .set_content_metadata(space_id, content_id, metadata)
            .instrument(self.span("set_content_metadata"))
            .await
    }
}
