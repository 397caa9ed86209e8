//! # Checksums
//!
//! Streaming digests used to verify content integrity on every write and read
//! path. Content is digested chunk by chunk so nothing is ever buffered in
//! full. A [`DigestStream`] computes the digest while a consumer reads
//! through it, and a [`VerifyingStream`] fails the read when the final digest
//! does not match the expected one.
//!
//! Digest state belongs to exactly one stream. Create a new wrapper for every
//! operation.
use std::{
    fmt,
    pin::Pin,
    sync::{Arc, OnceLock},
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::stream::BytesStream;

const BUFFER_SIZE: usize = 8 * 1024;

/// Supported digest algorithms.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Algorithm {
    #[serde(rename = "MD5")]
    #[default]
    Md5,
    #[serde(rename = "SHA-256")]
    Sha256,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => f.write_str("MD5"),
            Self::Sha256 => f.write_str("SHA-256"),
        }
    }
}

enum Hasher {
    Md5(md5::Context),
    Sha256(Sha256),
}

impl Hasher {
    fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Md5 => Self::Md5(md5::Context::new()),
            Algorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(data),
            Self::Sha256(hasher) => hasher.update(data),
        }
    }

    fn finalize(self) -> String {
        match self {
            Self::Md5(ctx) => format!("{:x}", ctx.compute()),
            Self::Sha256(hasher) => format!("{:x}", hasher.finalize()),
        }
    }
}

/// Compares two hex digests, ignoring case.
#[must_use]
pub fn checksums_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Computes digests with a fixed algorithm.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChecksumUtil {
    algorithm: Algorithm,
}

impl ChecksumUtil {
    #[must_use]
    pub fn new(algorithm: Algorithm) -> Self {
        Self { algorithm }
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Lowercase hex digest of the given bytes.
    #[must_use]
    pub fn checksum_bytes(&self, data: &[u8]) -> String {
        let mut hasher = Hasher::new(self.algorithm);
        hasher.update(data);
        hasher.finalize()
    }

    /// Digest of everything `reader` yields, read in fixed-size chunks.
    ///
    /// # Errors
    ///
    /// Returns the read error of the underlying reader.
    pub async fn checksum_reader<R>(&self, mut reader: R) -> std::io::Result<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut hasher = Hasher::new(self.algorithm);
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            let read = reader.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(hasher.finalize())
    }

    /// Digest of a whole stream, consuming it chunk by chunk.
    ///
    /// # Errors
    ///
    /// Returns the first error item of the stream.
    pub async fn checksum_stream(&self, mut stream: BytesStream) -> std::io::Result<String> {
        let mut hasher = Hasher::new(self.algorithm);
        while let Some(chunk) = stream.next().await {
            hasher.update(&chunk?);
        }
        Ok(hasher.finalize())
    }

    /// Wraps `stream` so the digest is computed while it is read. The
    /// returned handle yields the checksum once the stream is drained.
    #[must_use]
    pub fn wrap(&self, stream: BytesStream) -> (DigestStream, ChecksumHandle) {
        let result = Arc::new(OnceLock::new());
        let handle = ChecksumHandle {
            result: result.clone(),
        };
        (
            DigestStream {
                inner: stream,
                hasher: Some(Hasher::new(self.algorithm)),
                result,
            },
            handle,
        )
    }

    /// Wraps `stream` so reading it to the end fails when its digest differs
    /// from `expected`.
    #[must_use]
    pub fn verify(&self, stream: BytesStream, expected: &str, item: &str) -> VerifyingStream {
        let (inner, handle) = self.wrap(stream);
        VerifyingStream {
            inner,
            handle,
            expected: expected.to_string(),
            item: item.to_string(),
            finished: false,
        }
    }
}

/// Read side of a [`DigestStream`].
#[derive(Debug, Clone)]
pub struct ChecksumHandle {
    result: Arc<OnceLock<String>>,
}

impl ChecksumHandle {
    /// The final digest, or `None` while the stream has not been drained.
    #[must_use]
    pub fn checksum(&self) -> Option<String> {
        self.result.get().cloned()
    }
}

/// A stream that digests every chunk passing through it.
pub struct DigestStream {
    inner: BytesStream,
    hasher: Option<Hasher>,
    result: Arc<OnceLock<String>>,
}

impl DigestStream {
    #[must_use]
    pub fn into_bytes_stream(self) -> BytesStream {
        BytesStream::from_stream(self)
    }
}

impl Stream for DigestStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(hasher) = this.hasher.as_mut() {
                    hasher.update(&chunk);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                if let Some(hasher) = this.hasher.take() {
                    let _ = this.result.set(hasher.finalize());
                }
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

/// A stream that fails at its end when the digest of what was read differs
/// from the expected checksum.
pub struct VerifyingStream {
    inner: DigestStream,
    handle: ChecksumHandle,
    expected: String,
    item: String,
    finished: bool,
}

impl VerifyingStream {
    #[must_use]
    pub fn into_bytes_stream(self) -> BytesStream {
        BytesStream::from_stream(self)
    }
}

impl Stream for VerifyingStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                this.finished = true;
                match this.handle.checksum() {
                    Some(actual) if !checksums_match(&actual, &this.expected) => {
                        Poll::Ready(Some(Err(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!(
                                "checksum mismatch for {}: expected {}, computed {}",
                                this.item, this.expected, actual
                            ),
                        ))))
                    }
                    _ => Poll::Ready(None),
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;

    fn chunked(parts: &[&'static str]) -> BytesStream {
        BytesStream::from_stream(stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        ))
    }

    #[test]
    fn md5_of_known_value() {
        let util = ChecksumUtil::default();
        assert_eq!(
            util.checksum_bytes(b"hello world"),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn sha256_of_known_value() {
        let util = ChecksumUtil::new(Algorithm::Sha256);
        assert_eq!(
            util.checksum_bytes(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn stream_digest_matches_bytes_digest() {
        let util = ChecksumUtil::default();
        let streamed = util
            .checksum_stream(chunked(&["hello", " ", "world"]))
            .await
            .unwrap();
        assert_eq!(streamed, util.checksum_bytes(b"hello world"));
    }

    #[tokio::test]
    async fn reader_digest_matches_bytes_digest() {
        let util = ChecksumUtil::default();
        let data = vec![7u8; BUFFER_SIZE * 3 + 11];
        let digest = util.checksum_reader(data.as_slice()).await.unwrap();
        assert_eq!(digest, util.checksum_bytes(&data));
    }

    #[tokio::test]
    async fn digest_stream_is_available_after_drain() {
        let util = ChecksumUtil::default();
        let (stream, handle) = util.wrap(chunked(&["hello", " world"]));
        assert!(handle.checksum().is_none());

        let content = stream.into_bytes_stream().collect().await.unwrap();
        assert_eq!(content, Bytes::from("hello world"));
        assert_eq!(
            handle.checksum().unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[tokio::test]
    async fn verifying_stream_passes_on_match() {
        let util = ChecksumUtil::default();
        let stream = util.verify(
            chunked(&["hello world"]),
            "5EB63BBBE01EEED093CB22BB8F5ACDC3",
            "space/item",
        );
        assert!(stream.into_bytes_stream().collect().await.is_ok());
    }

    #[tokio::test]
    async fn verifying_stream_fails_on_mismatch() {
        let util = ChecksumUtil::default();
        let stream = util.verify(chunked(&["hello world"]), "deadbeef", "space/item");
        let err = stream.into_bytes_stream().collect().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("space/item"));
    }
}
