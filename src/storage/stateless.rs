//! # Stateless Storage Provider
//!
//! Wraps a raw provider and adds the behavior every backend must expose
//! uniformly:
//!
//! * `add_content` substitutes a default mimetype, digests the bytes on their
//!   way to the backend, and fails with
//!   [`StorageError::ChecksumMismatch`] when the backend, the caller and the
//!   computed checksum disagree. A mismatched item is removed.
//! * `create_space` polls until the new space is visible, for backends that
//!   are eventually consistent, and fails once the poll budget is spent.
//! * `get_space_metadata` fills in `METADATA_SPACE_CREATED`,
//!   `METADATA_SPACE_COUNT` and `METADATA_SPACE_ACCESS` when the backend does
//!   not report them.
//! * `get_content` verifies the stored checksum while the stream is read.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    checksum::{checksums_match, Algorithm, ChecksumUtil},
    model::{
        normalize_keys, validate_content_id, validate_space_id, AccessType, Content, Metadata,
        SpaceAcls, DEFAULT_MIMETYPE, METADATA_SPACE_ACCESS, METADATA_SPACE_COUNT,
        METADATA_SPACE_CREATED,
    },
    provider::StorageProvider,
    retry::Retrier,
    stream::BytesStream,
    StorageError, StorageResult,
};

/// Spaces holding more items than this report a count of `1000+`.
const MAX_COUNTED_ITEMS: usize = 1000;

fn default_create_space_attempts() -> u32 {
    20
}

fn default_create_space_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_mimetype() -> String {
    DEFAULT_MIMETYPE.to_string()
}

/// Stateless provider configuration
///
/// Example:
/// ```yaml
/// stateless:
///   create_space_attempts: 20
///   create_space_delay_ms: 2000
///   default_mimetype: application/octet-stream
///   algorithm: MD5
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatelessConfig {
    /// How many times to check that a new space exists before giving up.
    #[serde(default = "default_create_space_attempts")]
    pub create_space_attempts: u32,

    /// Delay between space existence checks.
    #[serde(
        default = "default_create_space_delay",
        rename = "create_space_delay_ms",
        with = "super::retry::duration_ms"
    )]
    pub create_space_delay: Duration,

    /// Mimetype stored for content added without one.
    #[serde(default = "default_mimetype")]
    pub default_mimetype: String,

    /// Checksum algorithm used to verify content.
    #[serde(default)]
    pub algorithm: Algorithm,
}

impl Default for StatelessConfig {
    fn default() -> Self {
        Self {
            create_space_attempts: default_create_space_attempts(),
            create_space_delay: default_create_space_delay(),
            default_mimetype: default_mimetype(),
            algorithm: Algorithm::default(),
        }
    }
}

pub struct StatelessStorageProvider {
    inner: Arc<dyn StorageProvider>,
    config: StatelessConfig,
    checksum: ChecksumUtil,
}

impl StatelessStorageProvider {
    #[must_use]
    pub fn new(inner: Arc<dyn StorageProvider>, config: StatelessConfig) -> Self {
        let checksum = ChecksumUtil::new(config.algorithm);
        Self {
            inner,
            config,
            checksum,
        }
    }

    #[must_use]
    pub fn config(&self) -> &StatelessConfig {
        &self.config
    }

    async fn wait_for_space(&self, space_id: &str) -> StorageResult<()> {
        let attempts = self.config.create_space_attempts.max(1);
        Retrier::new(attempts, self.config.create_space_delay)
            .execute_if(
                || async move {
                    if self.inner.space_exists(space_id).await? {
                        Ok(())
                    } else {
                        debug!(space_id, "space not visible yet");
                        Err(StorageError::SpaceNotAvailable {
                            space_id: space_id.to_string(),
                            attempts,
                        })
                    }
                },
                |err| matches!(err, StorageError::SpaceNotAvailable { .. }),
            )
            .await
    }

    async fn remove_mismatched(&self, space_id: &str, content_id: &str) {
        if let Err(err) = self.inner.delete_content(space_id, content_id).await {
            warn!(space_id, content_id, error = %err, "could not remove content with mismatched checksum");
        }
    }
}

#[async_trait]
impl StorageProvider for StatelessStorageProvider {
    async fn get_spaces(&self) -> StorageResult<Vec<String>> {
        self.inner.get_spaces().await
    }

    async fn get_space_contents_chunk(
        &self,
        space_id: &str,
        prefix: Option<&str>,
        max_results: usize,
        marker: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        self.inner
            .get_space_contents_chunk(space_id, prefix, max_results, marker)
            .await
    }

    async fn create_space(&self, space_id: &str) -> StorageResult<()> {
        validate_space_id(space_id)?;
        self.inner.create_space(space_id).await?;
        self.wait_for_space(space_id).await?;

        let metadata = self.inner.get_space_metadata(space_id).await?;
        if !metadata.contains_key(METADATA_SPACE_ACCESS) {
            self.inner
                .set_space_access(space_id, AccessType::default())
                .await?;
        }
        Ok(())
    }

    async fn delete_space(&self, space_id: &str) -> StorageResult<()> {
        self.inner.delete_space(space_id).await
    }

    async fn space_exists(&self, space_id: &str) -> StorageResult<bool> {
        self.inner.space_exists(space_id).await
    }

    async fn get_space_metadata(&self, space_id: &str) -> StorageResult<Metadata> {
        let mut metadata = self.inner.get_space_metadata(space_id).await?;

        if !metadata.contains_key(METADATA_SPACE_CREATED) {
            metadata.insert(METADATA_SPACE_CREATED.to_string(), Utc::now().to_rfc3339());
        }
        if !metadata.contains_key(METADATA_SPACE_ACCESS) {
            let access = match self.inner.get_space_access(space_id).await {
                Ok(access) => access,
                Err(err) if err.is_not_found() => return Err(err),
                Err(err) => {
                    debug!(space_id, error = %err, "space access unavailable, reporting default");
                    AccessType::default()
                }
            };
            metadata.insert(METADATA_SPACE_ACCESS.to_string(), access.to_string());
        }
        if !metadata.contains_key(METADATA_SPACE_COUNT) {
            let items = self
                .inner
                .get_space_contents_chunk(space_id, None, MAX_COUNTED_ITEMS + 1, None)
                .await?;
            let count = if items.len() > MAX_COUNTED_ITEMS {
                format!("{MAX_COUNTED_ITEMS}+")
            } else {
                items.len().to_string()
            };
            metadata.insert(METADATA_SPACE_COUNT.to_string(), count);
        }

        Ok(metadata)
    }

    async fn set_space_metadata(&self, space_id: &str, metadata: &Metadata) -> StorageResult<()> {
        self.inner
            .set_space_metadata(space_id, &normalize_keys(metadata))
            .await
    }

    async fn get_space_access(&self, space_id: &str) -> StorageResult<AccessType> {
        self.inner.get_space_access(space_id).await
    }

    async fn set_space_access(&self, space_id: &str, access: AccessType) -> StorageResult<()> {
        self.inner.set_space_access(space_id, access).await
    }

    async fn get_space_acls(&self, space_id: &str) -> StorageResult<SpaceAcls> {
        self.inner.get_space_acls(space_id).await
    }

    async fn set_space_acls(&self, space_id: &str, acls: &SpaceAcls) -> StorageResult<()> {
        self.inner.set_space_acls(space_id, acls).await
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
        validate_content_id(content_id)?;
        let mimetype = mimetype
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.config.default_mimetype);
        let metadata = metadata.map(normalize_keys);
        let (stream, handle) = self.checksum.wrap(stream);

        let stored = self
            .inner
            .add_content(
                space_id,
                content_id,
                Some(mimetype),
                metadata.as_ref(),
                size,
                checksum,
                stream.into_bytes_stream(),
            )
            .await?;

        let item = format!("{space_id}/{content_id}");
        let Some(computed) = handle.checksum() else {
            self.remove_mismatched(space_id, content_id).await;
            return Err(StorageError::msg(format!(
                "content stream of {item} was not fully consumed by the provider"
            )));
        };

        let expected = checksum.map_or_else(|| computed.clone(), ToString::to_string);
        if !checksums_match(&expected, &computed) || !checksums_match(&computed, &stored) {
            self.remove_mismatched(space_id, content_id).await;
            let actual = if checksums_match(&computed, &stored) {
                computed
            } else {
                stored
            };
            return Err(StorageError::ChecksumMismatch {
                item,
                expected,
                actual,
            });
        }

        Ok(stored)
    }

    async fn get_content(&self, space_id: &str, content_id: &str) -> StorageResult<Content> {
        let content = self.inner.get_content(space_id, content_id).await?;
        let Some(expected) = content.checksum().map(ToString::to_string) else {
            return Ok(content);
        };
        let item = format!("{space_id}/{content_id}");
        Ok(Content {
            stream: self
                .checksum
                .verify(content.stream, &expected, &item)
                .into_bytes_stream(),
            ..content
        })
    }

    async fn delete_content(&self, space_id: &str, content_id: &str) -> StorageResult<()> {
        self.inner.delete_content(space_id, content_id).await
    }

    async fn get_content_metadata(
        &self,
        space_id: &str,
        content_id: &str,
    ) -> StorageResult<Metadata> {
        self.inner.get_content_metadata(space_id, content_id).await
    }

    async fn set_content_metadata(
        &self,
        space_id: &str,
        content_id: &str,
        metadata: &Metadata,
    ) -> StorageResult<()> {
        self.inner
            .set_content_metadata(space_id, content_id, &normalize_keys(metadata))
            .await
    }
}
