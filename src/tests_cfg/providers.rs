//! Providers that misbehave on purpose, wrapping a working one.
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;

use crate::storage::{
    model::{AccessType, Content, Metadata, SpaceAcls, SYSTEM_SPACE_METADATA},
    provider::StorageProvider,
    stream::BytesStream,
    StorageError, StorageResult,
};

/// Wraps a provider and injects failures, lag or corruption.
///
/// Every call is counted by operation name, see [`FaultyProvider::calls`].
pub struct FaultyProvider {
    inner: Arc<dyn StorageProvider>,
    calls: Mutex<BTreeMap<&'static str, usize>>,
    failures: Mutex<BTreeMap<&'static str, usize>>,
    hidden_space_checks: Mutex<usize>,
    corrupt_checksums: bool,
    corrupt_reads: bool,
    strip_system_metadata: bool,
}

impl FaultyProvider {
    pub fn new(inner: impl Into<Arc<dyn StorageProvider>>) -> Self {
        Self {
            inner: inner.into(),
            calls: Mutex::default(),
            failures: Mutex::default(),
            hidden_space_checks: Mutex::new(0),
            corrupt_checksums: false,
            corrupt_reads: false,
            strip_system_metadata: false,
        }
    }

    /// The next `times` calls of `operation` fail with a transient error.
    #[must_use]
    pub fn fail_times(self, operation: &'static str, times: usize) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation, times);
        self
    }

    /// Every call of `operation` fails with a transient error.
    #[must_use]
    pub fn fail_always(self, operation: &'static str) -> Self {
        self.fail_times(operation, usize::MAX)
    }

    /// The first `checks` calls of `space_exists` report `false`.
    #[must_use]
    pub fn hide_new_spaces(self, checks: usize) -> Self {
        *self
            .hidden_space_checks
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = checks;
        self
    }

    /// `add_content` reports a checksum that does not match the stored bytes.
    #[must_use]
    pub fn corrupt_checksums(mut self) -> Self {
        self.corrupt_checksums = true;
        self
    }

    /// `get_content` returns bytes other than the stored ones.
    #[must_use]
    pub fn corrupt_reads(mut self) -> Self {
        self.corrupt_reads = true;
        self
    }

    /// `get_space_metadata` omits the created, count and access entries.
    #[must_use]
    pub fn strip_system_metadata(mut self) -> Self {
        self.strip_system_metadata = true;
        self
    }

    /// Number of times `operation` was called.
    #[must_use]
    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, operation: &'static str) -> StorageResult<()> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation)
            .or_default() += 1;

        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        match failures.get_mut(operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StorageError::msg(format!("injected failure in {operation}")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl StorageProvider for FaultyProvider {
    async fn get_spaces(&self) -> StorageResult<Vec<String>> {
        self.record("get_spaces")?;
        self.inner.get_spaces().await
    }

    async fn get_space_contents_chunk(
        &self,
        space_id: &str,
        prefix: Option<&str>,
        max_results: usize,
        marker: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        self.record("get_space_contents_chunk")?;
        self.inner
            .get_space_contents_chunk(space_id, prefix, max_results, marker)
            .await
    }

    async fn create_space(&self, space_id: &str) -> StorageResult<()> {
        self.record("create_space")?;
        self.inner.create_space(space_id).await
    }

    async fn delete_space(&self, space_id: &str) -> StorageResult<()> {
        self.record("delete_space")?;
        self.inner.delete_space(space_id).await
    }

    async fn space_exists(&self, space_id: &str) -> StorageResult<bool> {
        self.record("space_exists")?;
        {
            let mut hidden = self
                .hidden_space_checks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *hidden > 0 {
                *hidden -= 1;
                return Ok(false);
            }
        }
        self.inner.space_exists(space_id).await
    }

    async fn get_space_metadata(&self, space_id: &str) -> StorageResult<Metadata> {
        self.record("get_space_metadata")?;
        let mut metadata = self.inner.get_space_metadata(space_id).await?;
        if self.strip_system_metadata {
            metadata.retain(|key, _| !SYSTEM_SPACE_METADATA.contains(&key.as_str()));
        }
        Ok(metadata)
    }

    async fn set_space_metadata(&self, space_id: &str, metadata: &Metadata) -> StorageResult<()> {
        self.record("set_space_metadata")?;
        self.inner.set_space_metadata(space_id, metadata).await
    }

    async fn get_space_access(&self, space_id: &str) -> StorageResult<AccessType> {
        self.record("get_space_access")?;
        self.inner.get_space_access(space_id).await
    }

    async fn set_space_access(&self, space_id: &str, access: AccessType) -> StorageResult<()> {
        self.record("set_space_access")?;
        self.inner.set_space_access(space_id, access).await
    }

    async fn get_space_acls(&self, space_id: &str) -> StorageResult<SpaceAcls> {
        self.record("get_space_acls")?;
        self.inner.get_space_acls(space_id).await
    }

    async fn set_space_acls(&self, space_id: &str, acls: &SpaceAcls) -> StorageResult<()> {
        self.record("set_space_acls")?;
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
        self.record("add_content")?;
        let stored = self
            .inner
            .add_content(
                space_id, content_id, mimetype, metadata, size, checksum, stream,
            )
            .await?;
        if self.corrupt_checksums {
            Ok("0".repeat(stored.len()))
        } else {
            Ok(stored)
        }
    }

    async fn get_content(&self, space_id: &str, content_id: &str) -> StorageResult<Content> {
        self.record("get_content")?;
        let content = self.inner.get_content(space_id, content_id).await?;
        if self.corrupt_reads {
            Ok(Content {
                stream: BytesStream::from_bytes("corrupted"),
                ..content
            })
        } else {
            Ok(content)
        }
    }

    async fn delete_content(&self, space_id: &str, content_id: &str) -> StorageResult<()> {
        self.record("delete_content")?;
        self.inner.delete_content(space_id, content_id).await
    }

    async fn get_content_metadata(
        &self,
        space_id: &str,
        content_id: &str,
    ) -> StorageResult<Metadata> {
        self.record("get_content_metadata")?;
        self.inner.get_content_metadata(space_id, content_id).await
    }

    async fn set_content_metadata(
        &self,
        space_id: &str,
        content_id: &str,
        metadata: &Metadata,
    ) -> StorageResult<()> {
        self.record("set_content_metadata")?;
        self.inner
            .set_content_metadata(space_id, content_id, metadata)
            .await
    }
}
