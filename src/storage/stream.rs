use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures_util::{stream, Stream, StreamExt, TryStreamExt};
use opendal::Reader;

use super::StorageResult;

type Chunks = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Content bytes in transit between providers, read chunk by chunk.
///
/// Backend readers are adapted to plain `io::Result<Bytes>` chunks so callers
/// never depend on `OpenDAL` types.
pub struct BytesStream {
    chunks: Chunks,
}

impl BytesStream {
    pub(crate) async fn from_reader(reader: Reader) -> StorageResult<Self> {
        let chunks = reader.into_bytes_stream(..).await?;
        Ok(Self::from_stream(chunks.map_err(io::Error::other)))
    }

    /// One chunk holding `data`, or no chunk at all when it is empty.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        if data.is_empty() {
            Self::from_stream(stream::empty())
        } else {
            Self::from_stream(stream::iter([Ok(data)]))
        }
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            chunks: Box::pin(stream),
        }
    }

    /// Reads the remaining chunks into memory.
    ///
    /// # Errors
    ///
    /// Returns the first read error.
    pub async fn collect(self) -> io::Result<Bytes> {
        self.chunks
            .try_fold(BytesMut::new(), |mut buffer, chunk| async move {
                buffer.extend_from_slice(&chunk);
                Ok(buffer)
            })
            .await
            .map(BytesMut::freeze)
    }
}

impl Stream for BytesStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.chunks.poll_next_unpin(cx)
    }
}

impl From<Bytes> for BytesStream {
    fn from(data: Bytes) -> Self {
        Self::from_bytes(data)
    }
}

impl From<Vec<u8>> for BytesStream {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}

impl From<&'static str> for BytesStream {
    fn from(data: &'static str) -> Self {
        Self::from_bytes(data)
    }
}
