//! # Application Context
//!
//! Everything a host process needs to serve storage calls and duplication
//! events, built once from the configuration.
use std::sync::Arc;

use crate::{
    config::Config,
    duplication::DuplicationService,
    environment::Environment,
    storage::{broker::StorageProviderFactory, StorageResult},
};

pub struct AppContext {
    /// The environment the configuration was loaded for.
    pub environment: Environment,
    /// Configuration settings the context was built from.
    pub config: Config,
    /// Providers of every configured storage account.
    pub storage: Arc<StorageProviderFactory>,
    /// Mirrors the primary store to secondary stores. `None` when the
    /// configuration has no `duplication` section.
    pub duplication: Option<Arc<DuplicationService>>,
}

impl AppContext {
    /// Builds the storage factory and, when configured, the duplication
    /// service.
    ///
    /// # Errors
    ///
    /// Returns an error when a storage driver cannot be built or the
    /// accounts do not name exactly one primary.
    pub fn create(environment: Environment, config: Config) -> StorageResult<Self> {
        let storage = Arc::new(StorageProviderFactory::from_config(
            &config.storage,
            &config.stateless,
        )?);
        let duplication = config
            .duplication
            .as_ref()
            .map(|duplication| {
                DuplicationService::from_factory(&storage, duplication.mapping(), &duplication.retry)
                    .map(Arc::new)
            })
            .transpose()?;

        Ok(Self {
            environment,
            config,
            storage,
            duplication,
        })
    }
}
