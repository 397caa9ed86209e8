//! # Storage Provider
//!
//! The operation set every storage backend implements: spaces, content,
//! metadata and access control. Decorators such as
//! [`super::stateless::StatelessStorageProvider`] and
//! [`super::broker::BrokeredStorageProvider`] implement the same trait and
//! delegate to an inner provider.
use async_trait::async_trait;
use futures_util::{
    stream::{self, BoxStream},
    StreamExt, TryStreamExt,
};

use super::{
    model::{user_metadata, AccessType, Content, Metadata, SpaceAcls},
    stream::BytesStream,
    StorageError, StorageResult,
};

/// Number of content ids fetched per page by [`StorageProvider::get_space_contents`].
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Lazily fetched sequence of content ids.
pub type ContentIdStream<'a> = BoxStream<'a, StorageResult<String>>;

#[async_trait]
pub trait StorageProvider: Sync + Send {
    /// Lists the ids of all spaces, sorted.
    ///
    /// # Errors
    ///
    /// Returns a [`super::StorageError`] when the backend cannot be listed.
    async fn get_spaces(&self) -> StorageResult<Vec<String>>;

    /// Lists at most `max_results` content ids of a space, sorted, starting
    /// strictly after `marker` and restricted to ids beginning with
    /// `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the space does not
    /// exist.
    async fn get_space_contents_chunk(
        &self,
        space_id: &str,
        prefix: Option<&str>,
        max_results: usize,
        marker: Option<&str>,
    ) -> StorageResult<Vec<String>>;

    /// Lists every content id of a space. Pages are fetched on demand while
    /// the stream is consumed; calling again lists from the start.
    fn get_space_contents<'a>(
        &'a self,
        space_id: &'a str,
        prefix: Option<&'a str>,
    ) -> ContentIdStream<'a> {
        content_ids(self, space_id, prefix, DEFAULT_PAGE_SIZE)
    }

    /// Creates an empty space.
    ///
    /// # Errors
    ///
    /// Returns a [`super::StorageError`] when the space cannot be created.
    async fn create_space(&self, space_id: &str) -> StorageResult<()>;

    /// Deletes a space and everything in it.
    ///
    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the space does not
    /// exist.
    async fn delete_space(&self, space_id: &str) -> StorageResult<()>;

    /// Checks whether a space exists.
    ///
    /// # Errors
    ///
    /// Returns a [`super::StorageError`] for failures other than a missing
    /// space.
    async fn space_exists(&self, space_id: &str) -> StorageResult<bool> {
        match self.get_space_metadata(space_id).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Space metadata, including the `METADATA_SPACE_*` entries and one
    /// `PROPERTIES_SPACE_ACL` entry per grant.
    ///
    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the space does not
    /// exist.
    async fn get_space_metadata(&self, space_id: &str) -> StorageResult<Metadata>;

    /// Replaces the caller-owned space metadata. System entries are kept.
    ///
    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the space does not
    /// exist.
    async fn set_space_metadata(&self, space_id: &str, metadata: &Metadata) -> StorageResult<()>;

    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the space does not
    /// exist.
    async fn get_space_access(&self, space_id: &str) -> StorageResult<AccessType>;

    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the space does not
    /// exist.
    async fn set_space_access(&self, space_id: &str, access: AccessType) -> StorageResult<()>;

    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the space does not
    /// exist.
    async fn get_space_acls(&self, space_id: &str) -> StorageResult<SpaceAcls>;

    /// Replaces all grants of a space.
    ///
    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the space does not
    /// exist.
    async fn set_space_acls(&self, space_id: &str, acls: &SpaceAcls) -> StorageResult<()>;

    /// Stores a content item, replacing any existing item with the same id,
    /// and returns the checksum of the bytes actually stored.
    ///
    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the space does not
    /// exist, or [`super::StorageError::ChecksumMismatch`] when a given
    /// checksum does not match the stored bytes.
    #[allow(clippy::too_many_arguments)]
    async fn add_content(
        &self,
        space_id: &str,
        content_id: &str,
        mimetype: Option<&str>,
        metadata: Option<&Metadata>,
        size: Option<u64>,
        checksum: Option<&str>,
        stream: BytesStream,
    ) -> StorageResult<String>;

    /// Opens a content item for reading.
    ///
    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the space or content
    /// item does not exist.
    async fn get_content(&self, space_id: &str, content_id: &str) -> StorageResult<Content>;

    /// Copies a content item, with its mimetype and user metadata, and
    /// returns the checksum of the copy.
    ///
    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the source item or the
    /// destination space does not exist.
    async fn copy_content(
        &self,
        source_space_id: &str,
        source_content_id: &str,
        dest_space_id: &str,
        dest_content_id: &str,
    ) -> StorageResult<String> {
        let content = self.get_content(source_space_id, source_content_id).await?;
        let mimetype = content.mimetype().map(ToString::to_string);
        let checksum = content.checksum().map(ToString::to_string);
        let size = content.size();
        let metadata = user_metadata(&content.metadata);

        self.add_content(
            dest_space_id,
            dest_content_id,
            mimetype.as_deref(),
            Some(&metadata),
            size,
            checksum.as_deref(),
            content.stream,
        )
        .await
    }

    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the space or content
    /// item does not exist.
    async fn delete_content(&self, space_id: &str, content_id: &str) -> StorageResult<()>;

    /// Content metadata: the user entries plus mimetype, size, modified and
    /// checksum.
    ///
    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the space or content
    /// item does not exist.
    async fn get_content_metadata(&self, space_id: &str, content_id: &str)
        -> StorageResult<Metadata>;

    /// Replaces the user metadata of a content item. An empty map clears
    /// every user entry; system entries survive. A mimetype entry updates
    /// the item's mimetype.
    ///
    /// # Errors
    ///
    /// Returns [`super::StorageError::NotFound`] when the space or content
    /// item does not exist.
    async fn set_content_metadata(
        &self,
        space_id: &str,
        content_id: &str,
        metadata: &Metadata,
    ) -> StorageResult<()>;
}

/// Pages through the content ids of a space with `page_size` ids per
/// backend request.
pub fn content_ids<'a, P>(
    provider: &'a P,
    space_id: &'a str,
    prefix: Option<&'a str>,
    page_size: usize,
) -> ContentIdStream<'a>
where
    P: StorageProvider + ?Sized,
{
    let page_size = page_size.max(1);
    stream::try_unfold(Some(None::<String>), move |state| async move {
        let Some(marker) = state else {
            return Ok::<_, StorageError>(None);
        };
        let page = provider
            .get_space_contents_chunk(space_id, prefix, page_size, marker.as_deref())
            .await?;
        let next = if page.len() < page_size {
            None
        } else {
            page.last().cloned().map(Some)
        };
        Ok(Some((page, next)))
    })
    .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}
