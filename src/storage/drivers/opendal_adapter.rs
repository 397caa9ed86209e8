//! A [`StorageProvider`] over any `OpenDAL` operator.
//!
//! Layout inside the operator root:
//!
//! * `<space>/.space.json` - space record: creation time, access, metadata
//!   and grants. Its presence is what makes a space exist.
//! * `<space>/<content id>` - content bytes.
//! * `<space>/.meta/<content id>.json` - content record: mimetype, size,
//!   checksum, modification time and user metadata.
//! * `<space>/.staging/<content id>` - bytes of a write in progress. They
//!   replace the content bytes only once their checksum was verified.
use std::collections::BinaryHeap;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{StreamExt, TryStreamExt};
use opendal::{layers::RetryLayer, ErrorKind, Operator};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::{
    checksum::{checksums_match, Algorithm, ChecksumUtil},
    model::{
        acls_to_metadata, normalize_keys, space_user_metadata, user_metadata, validate_content_id,
        AccessType, Content, Metadata, SpaceAcls, DEFAULT_MIMETYPE, METADATA_CONTENT_CHECKSUM,
        METADATA_CONTENT_MIMETYPE, METADATA_CONTENT_MODIFIED, METADATA_CONTENT_SIZE,
        METADATA_SPACE_ACCESS, METADATA_SPACE_CREATED,
    },
    provider::StorageProvider,
    stream::BytesStream,
    StorageError, StorageResult,
};

const SPACE_RECORD: &str = ".space.json";
const META_DIR: &str = ".meta/";
const STAGING_DIR: &str = ".staging/";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SpaceRecord {
    created: String,
    #[serde(default)]
    access: AccessType,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    acls: SpaceAcls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContentRecord {
    mimetype: String,
    size: u64,
    checksum: String,
    modified: String,
    #[serde(default)]
    metadata: Metadata,
}

impl ContentRecord {
    fn to_metadata(&self) -> Metadata {
        let mut metadata = self.metadata.clone();
        metadata.insert(
            METADATA_CONTENT_MIMETYPE.to_string(),
            self.mimetype.clone(),
        );
        metadata.insert(METADATA_CONTENT_SIZE.to_string(), self.size.to_string());
        metadata.insert(
            METADATA_CONTENT_CHECKSUM.to_string(),
            self.checksum.clone(),
        );
        metadata.insert(
            METADATA_CONTENT_MODIFIED.to_string(),
            self.modified.clone(),
        );
        metadata
    }
}

pub struct OpendalAdapter {
    opendal_impl: Operator,
    checksum: ChecksumUtil,
}

impl OpendalAdapter {
    /// Constructor for creating a new provider over the given operator.
    #[must_use]
    pub fn new(opendal_impl: Operator) -> Self {
        let opendal_impl = opendal_impl
            // Add retry layer with default settings
            .layer(RetryLayer::default().with_jitter());
        Self {
            opendal_impl,
            checksum: ChecksumUtil::default(),
        }
    }

    /// Use `algorithm` for the checksums this provider computes.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.checksum = ChecksumUtil::new(algorithm);
        self
    }

    fn space_record_path(space_id: &str) -> String {
        format!("{space_id}/{SPACE_RECORD}")
    }

    fn content_path(space_id: &str, content_id: &str) -> String {
        format!("{space_id}/{content_id}")
    }

    fn content_record_path(space_id: &str, content_id: &str) -> String {
        format!("{space_id}/{META_DIR}{content_id}.json")
    }

    fn staging_path(space_id: &str, content_id: &str) -> String {
        format!("{space_id}/{STAGING_DIR}{content_id}")
    }

    fn is_reserved(content_id: &str) -> bool {
        content_id == SPACE_RECORD
            || content_id.starts_with(META_DIR)
            || content_id.starts_with(STAGING_DIR)
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> StorageResult<T> {
        match self.opendal_impl.read(path).await {
            Ok(buf) => Ok(serde_json::from_slice(&buf.to_vec())?),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StorageError::not_found(what)),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_json<T: Serialize>(&self, path: &str, value: &T) -> StorageResult<()> {
        self.opendal_impl
            .write(path, serde_json::to_vec(value)?)
            .await?;
        Ok(())
    }

    async fn read_space(&self, space_id: &str) -> StorageResult<SpaceRecord> {
        self.read_json(
            &Self::space_record_path(space_id),
            &format!("space {space_id}"),
        )
        .await
    }

    async fn write_space(&self, space_id: &str, record: &SpaceRecord) -> StorageResult<()> {
        self.write_json(&Self::space_record_path(space_id), record)
            .await
    }

    async fn read_content_record(
        &self,
        space_id: &str,
        content_id: &str,
    ) -> StorageResult<ContentRecord> {
        // missing space reports the space, not the item
        self.read_space(space_id).await?;
        self.read_json(
            &Self::content_record_path(space_id, content_id),
            &format!("content {space_id}/{content_id}"),
        )
        .await
    }

    async fn remove_content(&self, space_id: &str, content_id: &str) -> StorageResult<()> {
        self.opendal_impl
            .delete(&Self::content_path(space_id, content_id))
            .await?;
        self.opendal_impl
            .delete(&Self::content_record_path(space_id, content_id))
            .await?;
        Ok(())
    }

    async fn discard_staged(&self, staging: &str) {
        if let Err(err) = self.opendal_impl.delete(staging).await {
            warn!(staging, error = %err, "could not remove staged content");
        }
    }

    /// Moves verified staged bytes over the content object.
    async fn promote(&self, staging: &str, path: &str) -> StorageResult<()> {
        let capability = self.opendal_impl.info().full_capability();
        if capability.rename {
            self.opendal_impl.rename(staging, path).await?;
            return Ok(());
        }
        if capability.copy {
            self.opendal_impl.copy(staging, path).await?;
        } else {
            let reader = self.opendal_impl.reader(staging).await?;
            self.write_stream(path, BytesStream::from_reader(reader).await?)
                .await?;
        }
        self.opendal_impl.delete(staging).await?;
        Ok(())
    }

    /// Streams `stream` into the content object, returning the stored size
    /// and checksum.
    async fn write_stream(
        &self,
        path: &str,
        stream: BytesStream,
    ) -> StorageResult<(u64, String)> {
        let (mut stream, handle) = self.checksum.wrap(stream);
        let mut writer = self.opendal_impl.writer(path).await?;
        let mut size: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = writer.abort().await;
                    return Err(StorageError::Any(Box::new(err)));
                }
            };
            size += chunk.len() as u64;
            writer.write(chunk).await?;
        }
        writer.close().await?;

        let checksum = handle
            .checksum()
            .ok_or_else(|| StorageError::msg(format!("checksum of {path} was not computed")))?;
        Ok((size, checksum))
    }
}

#[async_trait]
impl StorageProvider for OpendalAdapter {
    async fn get_spaces(&self) -> StorageResult<Vec<String>> {
        let entries = self.opendal_impl.list_with("/").recursive(true).await?;
        let suffix = format!("/{SPACE_RECORD}");
        let mut spaces = entries
            .iter()
            .filter_map(|entry| {
                entry
                    .path()
                    .trim_start_matches('/')
                    .strip_suffix(&suffix)
                    .filter(|space| !space.contains('/'))
                    .map(ToString::to_string)
            })
            .collect::<Vec<_>>();
        spaces.sort();
        Ok(spaces)
    }

    async fn get_space_contents_chunk(
        &self,
        space_id: &str,
        prefix: Option<&str>,
        max_results: usize,
        marker: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        self.read_space(space_id).await?;

        if max_results == 0 {
            return Ok(Vec::new());
        }

        // lexically ordered backends can resume at the marker and stop early
        let ordered = self
            .opendal_impl
            .info()
            .full_capability()
            .list_with_start_after;
        let root = format!("{space_id}/");
        let mut lister = self.opendal_impl.lister_with(&root).recursive(true);
        if let Some(marker) = marker.filter(|_| ordered) {
            lister = lister.start_after(&format!("{root}{marker}"));
        }
        let mut lister = lister.await?;

        // max-heap of the smallest ids seen so far
        let mut page = BinaryHeap::with_capacity(max_results + 1);
        while let Some(entry) = lister.try_next().await? {
            if !entry.metadata().mode().is_file() {
                continue;
            }
            let Some(id) = entry.path().trim_start_matches('/').strip_prefix(&root) else {
                continue;
            };
            if Self::is_reserved(id)
                || !prefix.map_or(true, |p| id.starts_with(p))
                || !marker.map_or(true, |m| id > m)
            {
                continue;
            }
            if ordered && page.len() == max_results {
                break;
            }
            page.push(id.to_string());
            if page.len() > max_results {
                page.pop();
            }
        }
        Ok(page.into_sorted_vec())
    }

    async fn create_space(&self, space_id: &str) -> StorageResult<()> {
        match self.read_space(space_id).await {
            Ok(_) => {
                debug!(space_id, "space already exists");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                let record = SpaceRecord {
                    created: Utc::now().to_rfc3339(),
                    ..SpaceRecord::default()
                };
                self.write_space(space_id, &record).await
            }
            Err(err) => Err(err),
        }
    }

    async fn delete_space(&self, space_id: &str) -> StorageResult<()> {
        self.read_space(space_id).await?;
        self.opendal_impl.remove_all(&format!("{space_id}/")).await?;
        Ok(())
    }

    async fn space_exists(&self, space_id: &str) -> StorageResult<bool> {
        Ok(self
            .opendal_impl
            .exists(&Self::space_record_path(space_id))
            .await?)
    }

    async fn get_space_metadata(&self, space_id: &str) -> StorageResult<Metadata> {
        let record = self.read_space(space_id).await?;
        let mut metadata = record.metadata.clone();
        metadata.insert(METADATA_SPACE_CREATED.to_string(), record.created.clone());
        metadata.insert(METADATA_SPACE_ACCESS.to_string(), record.access.to_string());
        metadata.extend(acls_to_metadata(&record.acls));
        Ok(metadata)
    }

    async fn set_space_metadata(&self, space_id: &str, metadata: &Metadata) -> StorageResult<()> {
        let mut record = self.read_space(space_id).await?;
        record.metadata = space_user_metadata(&normalize_keys(metadata));
        self.write_space(space_id, &record).await
    }

    async fn get_space_access(&self, space_id: &str) -> StorageResult<AccessType> {
        Ok(self.read_space(space_id).await?.access)
    }

    async fn set_space_access(&self, space_id: &str, access: AccessType) -> StorageResult<()> {
        let mut record = self.read_space(space_id).await?;
        record.access = access;
        self.write_space(space_id, &record).await
    }

    async fn get_space_acls(&self, space_id: &str) -> StorageResult<SpaceAcls> {
        Ok(self.read_space(space_id).await?.acls)
    }

    async fn set_space_acls(&self, space_id: &str, acls: &SpaceAcls) -> StorageResult<()> {
        let mut record = self.read_space(space_id).await?;
        record.acls = acls.clone();
        self.write_space(space_id, &record).await
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
        if Self::is_reserved(content_id) {
            return Err(StorageError::InvalidId {
                id: content_id.to_string(),
                reason: "reserved name".to_string(),
            });
        }
        self.read_space(space_id).await?;

        let staging = Self::staging_path(space_id, content_id);
        let (stored_size, computed) = match self.write_stream(&staging, stream).await {
            Ok(written) => written,
            Err(err) => {
                self.discard_staged(&staging).await;
                return Err(err);
            }
        };

        if let Some(expected) = checksum {
            if !checksums_match(expected, &computed) {
                self.discard_staged(&staging).await;
                return Err(StorageError::ChecksumMismatch {
                    item: format!("{space_id}/{content_id}"),
                    expected: expected.to_string(),
                    actual: computed,
                });
            }
        }
        self.promote(&staging, &Self::content_path(space_id, content_id))
            .await?;
        if let Some(declared) = size.filter(|declared| *declared != stored_size) {
            debug!(space_id, content_id, declared, stored_size, "declared size differs from stored size");
        }

        let record = ContentRecord {
            mimetype: mimetype
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_MIMETYPE)
                .to_string(),
            size: stored_size,
            checksum: computed.clone(),
            modified: Utc::now().to_rfc3339(),
            metadata: metadata
                .map(|m| user_metadata(&normalize_keys(m)))
                .unwrap_or_default(),
        };
        self.write_json(&Self::content_record_path(space_id, content_id), &record)
            .await?;

        Ok(computed)
    }

    async fn get_content(&self, space_id: &str, content_id: &str) -> StorageResult<Content> {
        let record = self.read_content_record(space_id, content_id).await?;
        let reader = self
            .opendal_impl
            .reader(&Self::content_path(space_id, content_id))
            .await?;
        Ok(Content {
            id: content_id.to_string(),
            metadata: record.to_metadata(),
            stream: BytesStream::from_reader(reader).await?,
        })
    }

    async fn delete_content(&self, space_id: &str, content_id: &str) -> StorageResult<()> {
        self.read_content_record(space_id, content_id).await?;
        self.remove_content(space_id, content_id).await
    }

    async fn get_content_metadata(
        &self,
        space_id: &str,
        content_id: &str,
    ) -> StorageResult<Metadata> {
        Ok(self
            .read_content_record(space_id, content_id)
            .await?
            .to_metadata())
    }

    async fn set_content_metadata(
        &self,
        space_id: &str,
        content_id: &str,
        metadata: &Metadata,
    ) -> StorageResult<()> {
        let mut record = self.read_content_record(space_id, content_id).await?;
        let metadata = normalize_keys(metadata);
        if let Some(mimetype) = metadata
            .get(METADATA_CONTENT_MIMETYPE)
            .filter(|m| !m.is_empty())
        {
            record.mimetype = mimetype.clone();
        }
        record.metadata = user_metadata(&metadata);
        record.modified = Utc::now().to_rfc3339();
        self.write_json(&Self::content_record_path(space_id, content_id), &record)
            .await
    }
}
