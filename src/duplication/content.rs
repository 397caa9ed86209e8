//! # Content Duplication
//!
//! * `create_content`: copies bytes, mimetype, user metadata and checksum.
//!   A missing source item is not an error and writes nothing. Every attempt
//!   opens a fresh source stream.
//! * `update_content`: pushes user metadata and mimetype. A destination
//!   without the item gets a full copy instead.
//! * `delete_content`: a missing destination item counts as deleted.
//!
//! Checksum mismatches are returned at once and never retried.
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::DuplicationRetry;
use crate::storage::{
    model::{user_metadata, DEFAULT_MIMETYPE, METADATA_CONTENT_MIMETYPE},
    StorageError, StorageProvider, StorageResult,
};

#[async_trait]
pub trait ContentDuplicator: Sync + Send {
    /// Copies an item to the destination and returns the checksum of the
    /// copy, or `None` when the source item does not exist.
    ///
    /// # Errors
    ///
    /// Returns the last destination error once the retry budget is spent,
    /// or a checksum mismatch right away.
    async fn create_content(
        &self,
        space_id: &str,
        content_id: &str,
    ) -> StorageResult<Option<String>>;

    /// # Errors
    ///
    /// Returns the last destination error once the retry budget is spent.
    async fn update_content(&self, space_id: &str, content_id: &str) -> StorageResult<()>;

    /// # Errors
    ///
    /// Returns the last destination error once the retry budget is spent.
    async fn delete_content(&self, space_id: &str, content_id: &str) -> StorageResult<()>;
}

/// Mirrors content items from one provider to another.
pub struct StoreContentDuplicator {
    from: Arc<dyn StorageProvider>,
    to: Arc<dyn StorageProvider>,
    retry: DuplicationRetry,
}

impl StoreContentDuplicator {
    #[must_use]
    pub fn new(
        from: Arc<dyn StorageProvider>,
        to: Arc<dyn StorageProvider>,
        retry: DuplicationRetry,
    ) -> Self {
        Self { from, to, retry }
    }

    async fn copy_once(&self, space_id: &str, content_id: &str) -> StorageResult<Option<String>> {
        let content = match self.from.get_content(space_id, content_id).await {
            Ok(content) => content,
            Err(err) if err.is_not_found() => {
                debug!(space_id, content_id, "source content not found, nothing to duplicate");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let mimetype = content.mimetype().unwrap_or(DEFAULT_MIMETYPE).to_string();
        let checksum = content.checksum().map(ToString::to_string);
        let size = content.size();
        let metadata = user_metadata(&content.metadata);

        self.to
            .add_content(
                space_id,
                content_id,
                Some(&mimetype),
                Some(&metadata),
                size,
                checksum.as_deref(),
                content.stream,
            )
            .await
            .map(Some)
    }
}

#[async_trait]
impl ContentDuplicator for StoreContentDuplicator {
    async fn create_content(
        &self,
        space_id: &str,
        content_id: &str,
    ) -> StorageResult<Option<String>> {
        self.retry
            .create
            .execute_if(
                || self.copy_once(space_id, content_id),
                StorageError::is_transient,
            )
            .await
    }

    async fn update_content(&self, space_id: &str, content_id: &str) -> StorageResult<()> {
        let source = match self.from.get_content_metadata(space_id, content_id).await {
            Ok(metadata) => metadata,
            Err(err) if err.is_not_found() => {
                debug!(space_id, content_id, "source content not found, nothing to update");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let mut metadata = user_metadata(&source);
        if let Some(mimetype) = source.get(METADATA_CONTENT_MIMETYPE) {
            metadata.insert(METADATA_CONTENT_MIMETYPE.to_string(), mimetype.clone());
        }
        let metadata = &metadata;

        let result = self
            .retry
            .update
            .execute_if(
                || async move {
                    self.to
                        .set_content_metadata(space_id, content_id, metadata)
                        .await
                },
                StorageError::is_transient,
            )
            .await;

        match result {
            Err(err) if err.is_not_found() => {
                debug!(space_id, content_id, "destination content missing, copying it");
                self.create_content(space_id, content_id).await.map(|_| ())
            }
            other => other,
        }
    }

    async fn delete_content(&self, space_id: &str, content_id: &str) -> StorageResult<()> {
        self.retry
            .delete
            .execute_if(
                || async move {
                    match self.to.delete_content(space_id, content_id).await {
                        Err(err) if err.is_not_found() => {
                            debug!(space_id, content_id, "destination content already deleted");
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
            checksum::ChecksumUtil,
            drivers::mem,
            model::{Metadata, METADATA_CONTENT_CHECKSUM},
        },
        tests_cfg::{config::fast_retry, providers::FaultyProvider},
    };

    struct Fixture {
        from: Arc<FaultyProvider>,
        to: Arc<FaultyProvider>,
        duplicator: StoreContentDuplicator,
    }

    async fn fixture(from: FaultyProvider, to: FaultyProvider) -> Fixture {
        let from = Arc::new(from);
        let to = Arc::new(to);
        from.create_space("space1").await.unwrap();
        to.create_space("space1").await.unwrap();
        let duplicator = StoreContentDuplicator::new(from.clone(), to.clone(), fast_retry());
        Fixture {
            from,
            to,
            duplicator,
        }
    }

    async fn add(provider: &FaultyProvider, content_id: &str, data: &'static str) {
        let metadata = Metadata::from([("color".to_string(), "blue".to_string())]);
        provider
            .add_content(
                "space1",
                content_id,
                Some("text/plain"),
                Some(&metadata),
                None,
                None,
                data.into(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_content_copies_bytes_and_metadata() {
        let f = fixture(
            FaultyProvider::new(mem::new()),
            FaultyProvider::new(mem::new()),
        )
        .await;
        add(&f.from, "a.txt", "hello").await;

        let checksum = f.duplicator.create_content("space1", "a.txt").await.unwrap();
        assert_eq!(
            checksum.as_deref(),
            Some(ChecksumUtil::default().checksum_bytes(b"hello").as_str())
        );

        let content = f.to.get_content("space1", "a.txt").await.unwrap();
        assert_eq!(content.mimetype(), Some("text/plain"));
        assert_eq!(content.metadata.get("color").unwrap(), "blue");
        assert_eq!(content.stream.collect().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn create_content_without_source_is_a_noop() {
        let f = fixture(
            FaultyProvider::new(mem::new()),
            FaultyProvider::new(mem::new()),
        )
        .await;

        assert_eq!(
            f.duplicator.create_content("space1", "missing").await.unwrap(),
            None
        );
        assert_eq!(f.to.calls("add_content"), 0);
    }

    #[tokio::test]
    async fn create_content_retries_with_fresh_stream() {
        let f = fixture(
            FaultyProvider::new(mem::new()),
            FaultyProvider::new(mem::new()).fail_times("add_content", 2),
        )
        .await;
        add(&f.from, "a.txt", "hello").await;

        f.duplicator.create_content("space1", "a.txt").await.unwrap();
        assert_eq!(f.to.calls("add_content"), 3);
        assert_eq!(f.from.calls("get_content"), 3);

        let content = f.to.get_content("space1", "a.txt").await.unwrap();
        assert_eq!(content.stream.collect().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn create_content_surfaces_last_error() {
        let f = fixture(
            FaultyProvider::new(mem::new()),
            FaultyProvider::new(mem::new()).fail_always("add_content"),
        )
        .await;
        add(&f.from, "a.txt", "hello").await;

        let err = f.duplicator.create_content("space1", "a.txt").await.unwrap_err();
        assert_eq!(err.to_string(), "injected failure in add_content");
        assert_eq!(f.to.calls("add_content"), 3);
    }

    #[tokio::test]
    async fn checksum_mismatch_is_not_retried() {
        let f = fixture(
            FaultyProvider::new(mem::new()).corrupt_reads(),
            FaultyProvider::new(mem::new()),
        )
        .await;
        add(&f.from, "a.txt", "hello").await;

        let err = f.duplicator.create_content("space1", "a.txt").await.unwrap_err();
        assert!(err.is_checksum_mismatch());
        assert_eq!(f.to.calls("add_content"), 1);
    }

    #[tokio::test]
    async fn update_content_pushes_metadata() {
        let f = fixture(
            FaultyProvider::new(mem::new()),
            FaultyProvider::new(mem::new()),
        )
        .await;
        add(&f.from, "a.txt", "hello").await;
        f.duplicator.create_content("space1", "a.txt").await.unwrap();

        f.from
            .set_content_metadata(
                "space1",
                "a.txt",
                &Metadata::from([
                    ("color".to_string(), "red".to_string()),
                    (METADATA_CONTENT_MIMETYPE.to_string(), "text/csv".to_string()),
                ]),
            )
            .await
            .unwrap();
        f.duplicator.update_content("space1", "a.txt").await.unwrap();

        let metadata = f.to.get_content_metadata("space1", "a.txt").await.unwrap();
        assert_eq!(metadata.get("color").unwrap(), "red");
        assert_eq!(metadata.get(METADATA_CONTENT_MIMETYPE).unwrap(), "text/csv");
        assert_eq!(f.to.calls("add_content"), 1);
    }

    #[tokio::test]
    async fn update_content_copies_when_destination_is_missing() {
        let f = fixture(
            FaultyProvider::new(mem::new()),
            FaultyProvider::new(mem::new()),
        )
        .await;
        add(&f.from, "a.txt", "hello").await;

        f.duplicator.update_content("space1", "a.txt").await.unwrap();

        assert_eq!(f.to.calls("add_content"), 1);
        let metadata = f.to.get_content_metadata("space1", "a.txt").await.unwrap();
        assert_eq!(
            metadata.get(METADATA_CONTENT_CHECKSUM).unwrap(),
            &ChecksumUtil::default().checksum_bytes(b"hello")
        );
    }

    #[tokio::test]
    async fn update_content_skips_missing_source() {
        let f = fixture(
            FaultyProvider::new(mem::new()),
            FaultyProvider::new(mem::new()),
        )
        .await;

        f.duplicator.update_content("space1", "a.txt").await.unwrap();
        assert_eq!(f.to.calls("set_content_metadata"), 0);
        assert_eq!(f.to.calls("add_content"), 0);
    }

    #[tokio::test]
    async fn delete_content_treats_missing_destination_as_done() {
        let f = fixture(
            FaultyProvider::new(mem::new()),
            FaultyProvider::new(mem::new()),
        )
        .await;

        f.duplicator.delete_content("space1", "a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn delete_content_retries_up_to_delete_budget() {
        let f = fixture(
            FaultyProvider::new(mem::new()),
            FaultyProvider::new(mem::new()).fail_always("delete_content"),
        )
        .await;

        assert!(f.duplicator.delete_content("space1", "a.txt").await.is_err());
        assert_eq!(f.to.calls("delete_content"), 5);
    }
}
