//! # Space Duplication
//!
//! * `create_space`: skipped when the source space is gone. An existing
//!   destination space counts as created. Metadata, access and ACLs follow.
//! * `update_space`/`update_space_acl`: create the destination space when it
//!   is missing, then push metadata and access, or ACLs.
//! * `delete_space`: a missing destination space counts as deleted.
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::DuplicationRetry;
use crate::storage::{model::space_user_metadata, StorageError, StorageProvider, StorageResult};

#[async_trait]
pub trait SpaceDuplicator: Sync + Send {
    /// # Errors
    ///
    /// Returns the last destination error once the retry budget is spent.
    async fn create_space(&self, space_id: &str) -> StorageResult<()>;

    /// Pushes space metadata and access.
    ///
    /// # Errors
    ///
    /// Returns the last destination error once the retry budget is spent.
    async fn update_space(&self, space_id: &str) -> StorageResult<()>;

    /// Pushes the space ACLs.
    ///
    /// # Errors
    ///
    /// Returns the last destination error once the retry budget is spent.
    async fn update_space_acl(&self, space_id: &str) -> StorageResult<()>;

    /// # Errors
    ///
    /// Returns the last destination error once the retry budget is spent.
    async fn delete_space(&self, space_id: &str) -> StorageResult<()>;
}

/// Mirrors spaces from one provider to another.
pub struct StoreSpaceDuplicator {
    from: Arc<dyn StorageProvider>,
    to: Arc<dyn StorageProvider>,
    retry: DuplicationRetry,
}

impl StoreSpaceDuplicator {
    #[must_use]
    pub fn new(
        from: Arc<dyn StorageProvider>,
        to: Arc<dyn StorageProvider>,
        retry: DuplicationRetry,
    ) -> Self {
        Self { from, to, retry }
    }

    async fn source_exists(&self, space_id: &str) -> StorageResult<bool> {
        let exists = self.from.space_exists(space_id).await?;
        if !exists {
            debug!(space_id, "source space not found, nothing to duplicate");
        }
        Ok(exists)
    }

    async fn ensure_destination(&self, space_id: &str) -> StorageResult<()> {
        self.retry
            .create
            .execute_if(
                || async move {
                    if self.to.space_exists(space_id).await? {
                        return Ok(());
                    }
                    self.to.create_space(space_id).await
                },
                StorageError::is_transient,
            )
            .await
    }

    async fn push_properties(&self, space_id: &str) -> StorageResult<()> {
        let metadata = space_user_metadata(&self.from.get_space_metadata(space_id).await?);
        let access = self.from.get_space_access(space_id).await?;
        let metadata = &metadata;

        self.retry
            .update
            .execute_if(
                || async move {
                    self.to.set_space_metadata(space_id, metadata).await?;
                    self.to.set_space_access(space_id, access).await
                },
                StorageError::is_transient,
            )
            .await
    }

    async fn push_acls(&self, space_id: &str) -> StorageResult<()> {
        let acls = self.from.get_space_acls(space_id).await?;
        let acls = &acls;

        self.retry
            .update
            .execute_if(
                || async move { self.to.set_space_acls(space_id, acls).await },
                StorageError::is_transient,
            )
            .await
    }
}

/// Source reads that find nothing end the duplication quietly.
fn skip_missing_source(result: StorageResult<()>, space_id: &str) -> StorageResult<()> {
    match result {
        Err(err) if err.is_not_found() => {
            debug!(space_id, error = %err, "space disappeared during duplication");
            Ok(())
        }
        other => other,
    }
}

#[async_trait]
impl SpaceDuplicator for StoreSpaceDuplicator {
    async fn create_space(&self, space_id: &str) -> StorageResult<()> {
        if !self.source_exists(space_id).await? {
            return Ok(());
        }
        self.ensure_destination(space_id).await?;

        let result = async {
            self.push_properties(space_id).await?;
            self.push_acls(space_id).await
        }
        .await;
        skip_missing_source(result, space_id)
    }

    async fn update_space(&self, space_id: &str) -> StorageResult<()> {
        if !self.source_exists(space_id).await? {
            return Ok(());
        }
        self.ensure_destination(space_id).await?;
        skip_missing_source(self.push_properties(space_id).await, space_id)
    }

    async fn update_space_acl(&self, space_id: &str) -> StorageResult<()> {
        if !self.source_exists(space_id).await? {
            return Ok(());
        }
        self.ensure_destination(space_id).await?;
        skip_missing_source(self.push_acls(space_id).await, space_id)
    }

    async fn delete_space(&self, space_id: &str) -> StorageResult<()> {
        self.retry
            .delete
            .execute_if(
                || async move {
                    match self.to.delete_space(space_id).await {
                        Err(err) if err.is_not_found() => {
                            debug!(space_id, "destination space already deleted");
                            Ok(())
                        }
                        other => other,
                    }
                },
                StorageError::is_transient,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        storage::{
            drivers::mem,
            model::{AccessType, AclPermission, Metadata, SpaceAcls},
        },
        tests_cfg::{config::fast_retry, providers::FaultyProvider},
    };

    struct Fixture {
        from: Arc<dyn StorageProvider>,
        to: Arc<FaultyProvider>,
        duplicator: StoreSpaceDuplicator,
    }

    fn fixture(to: FaultyProvider) -> Fixture {
        let from: Arc<dyn StorageProvider> = Arc::from(mem::new());
        let to = Arc::new(to);
        let duplicator = StoreSpaceDuplicator::new(from.clone(), to.clone(), fast_retry());
        Fixture {
            from,
            to,
            duplicator,
        }
    }

    async fn source_space(from: &Arc<dyn StorageProvider>, space_id: &str) {
        from.create_space(space_id).await.unwrap();
        from.set_space_metadata(
            space_id,
            &Metadata::from([("owner".to_string(), "alice".to_string())]),
        )
        .await
        .unwrap();
        from.set_space_access(space_id, AccessType::Open).await.unwrap();
        from.set_space_acls(
            space_id,
            &SpaceAcls::from([("group-curators".to_string(), AclPermission::Write)]),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn create_space_mirrors_properties() {
        let f = fixture(FaultyProvider::new(mem::new()));
        source_space(&f.from, "space1").await;

        f.duplicator.create_space("space1").await.unwrap();

        let metadata = f.to.get_space_metadata("space1").await.unwrap();
        assert_eq!(metadata.get("owner").unwrap(), "alice");
        assert_eq!(
            f.to.get_space_access("space1").await.unwrap(),
            AccessType::Open
        );
        assert_eq!(
            f.to.get_space_acls("space1").await.unwrap().get("group-curators"),
            Some(&AclPermission::Write)
        );
    }

    #[tokio::test]
    async fn create_space_skips_missing_source() {
        let f = fixture(FaultyProvider::new(mem::new()));

        f.duplicator.create_space("space1").await.unwrap();
        assert_eq!(f.to.calls("create_space"), 0);
    }

    #[tokio::test]
    async fn create_space_accepts_existing_destination() {
        let f = fixture(FaultyProvider::new(mem::new()));
        source_space(&f.from, "space1").await;
        f.to.create_space("space1").await.unwrap();

        f.duplicator.create_space("space1").await.unwrap();
        assert_eq!(f.to.calls("create_space"), 1);
    }

    #[tokio::test]
    async fn create_space_retries_transient_failures() {
        let f = fixture(FaultyProvider::new(mem::new()).fail_times("create_space", 2));
        source_space(&f.from, "space1").await;

        f.duplicator.create_space("space1").await.unwrap();
        assert_eq!(f.to.calls("create_space"), 3);
        assert!(f.to.space_exists("space1").await.unwrap());
    }

    #[tokio::test]
    async fn create_space_surfaces_error_after_budget() {
        let f = fixture(FaultyProvider::new(mem::new()).fail_always("create_space"));
        source_space(&f.from, "space1").await;

        let err = f.duplicator.create_space("space1").await.unwrap_err();
        assert!(err.to_string().contains("injected failure"));
        assert_eq!(f.to.calls("create_space"), 3);
    }

    #[tokio::test]
    async fn update_space_creates_missing_destination() {
        let f = fixture(FaultyProvider::new(mem::new()));
        source_space(&f.from, "space1").await;

        f.duplicator.update_space("space1").await.unwrap();

        assert_eq!(f.to.calls("create_space"), 1);
        assert_eq!(
            f.to.get_space_access("space1").await.unwrap(),
            AccessType::Open
        );
    }

    #[tokio::test]
    async fn update_space_overwrites_destination_metadata() {
        let f = fixture(FaultyProvider::new(mem::new()));
        source_space(&f.from, "space1").await;
        f.duplicator.create_space("space1").await.unwrap();

        f.from
            .set_space_metadata(
                "space1",
                &Metadata::from([("owner".to_string(), "bob".to_string())]),
            )
            .await
            .unwrap();
        f.duplicator.update_space("space1").await.unwrap();
        f.duplicator.update_space("space1").await.unwrap();

        let metadata = f.to.get_space_metadata("space1").await.unwrap();
        assert_eq!(metadata.get("owner").unwrap(), "bob");
    }

    #[tokio::test]
    async fn update_space_acl_pushes_grants() {
        let f = fixture(FaultyProvider::new(mem::new()));
        source_space(&f.from, "space1").await;
        f.duplicator.create_space("space1").await.unwrap();

        f.from
            .set_space_acls(
                "space1",
                &SpaceAcls::from([("user-bob".to_string(), AclPermission::Read)]),
            )
            .await
            .unwrap();
        f.duplicator.update_space_acl("space1").await.unwrap();

        let acls = f.to.get_space_acls("space1").await.unwrap();
        assert_eq!(acls.len(), 1);
        assert_eq!(acls.get("user-bob"), Some(&AclPermission::Read));
    }

    #[tokio::test]
    async fn delete_space_treats_missing_destination_as_done() {
        let f = fixture(FaultyProvider::new(mem::new()));

        f.duplicator.delete_space("space1").await.unwrap();
        assert_eq!(f.to.calls("delete_space"), 1);
    }

    #[tokio::test]
    async fn delete_space_uses_delete_budget() {
        let f = fixture(FaultyProvider::new(mem::new()).fail_times("delete_space", 4));
        source_space(&f.from, "space1").await;
        f.duplicator.create_space("space1").await.unwrap();

        f.duplicator.delete_space("space1").await.unwrap();
        assert_eq!(f.to.calls("delete_space"), 5);
        assert!(!f.to.space_exists("space1").await.unwrap());
    }
}
