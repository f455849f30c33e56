//! Blob store abstraction: the primary store holding image payloads.
//!
//! Listing follows S3 ListObjectsV2 semantics: bounded batches, an opaque
//! continuation token, no filter and no offset. Everything above that is the
//! listing backends' job.

pub mod disk;
pub mod memory;

use crate::services::error::{GalleryError, GalleryResult};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::io;

pub use disk::DiskBlobStore;
pub use memory::MemoryBlobStore;

/// Upper bound on the number of entries a single listing call returns.
pub const MAX_BATCH_SIZE: usize = 1000;

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// A raw record as enumerated by the blob store.
#[derive(Clone, Debug, PartialEq)]
pub struct BlobEntry {
    pub key: String,
    pub size_bytes: i64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct ListBatchRequest {
    pub continuation_token: Option<String>,
    pub max_keys: usize,
}

impl ListBatchRequest {
    pub fn first() -> Self {
        Self {
            continuation_token: None,
            max_keys: MAX_BATCH_SIZE,
        }
    }

    pub fn after(token: String) -> Self {
        Self {
            continuation_token: Some(token),
            max_keys: MAX_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Default)]
pub struct ListBatch {
    pub entries: Vec<BlobEntry>,
    /// Present iff more entries remain.
    pub next_continuation_token: Option<String>,
}

/// Payload stream plus the entry it belongs to.
pub struct BlobReader {
    pub entry: BlobEntry,
    pub body: BoxStream<'static, io::Result<Bytes>>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// One bounded listing call in store-native order.
    async fn list_batch(&self, request: ListBatchRequest) -> GalleryResult<ListBatch>;

    async fn exists(&self, key: &str) -> GalleryResult<bool>;

    /// Store `content` under `key`, failing with `DuplicateKey` if the key is taken.
    async fn put_if_absent(
        &self,
        key: &str,
        content_type: &str,
        content: Bytes,
    ) -> GalleryResult<BlobEntry>;

    async fn get(&self, key: &str) -> GalleryResult<BlobReader>;

    /// Remove `key`. Returns whether anything was removed; a missing key is not an error.
    async fn delete(&self, key: &str) -> GalleryResult<bool>;

    /// Issue a URL granting read access to `key` until `expires_at`.
    fn presign_get(&self, key: &str, expires_at: DateTime<Utc>) -> GalleryResult<String>;

    /// Validate a presigned URL's parameters for `key`.
    fn verify_presigned(&self, key: &str, expires: i64, signature: &str) -> GalleryResult<()>;

    /// Cheap write/read/delete round trip used by readiness checks.
    async fn probe(&self) -> GalleryResult<()>;
}

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Rejects empty or oversized keys, keys that begin with `/`, contain `..`,
/// `.` segments, backslashes or control characters. A `.` segment would be
/// dropped when the key is turned into a filesystem path.
pub fn ensure_key_safe(key: &str) -> GalleryResult<()> {
    if key.trim().is_empty() {
        return Err(GalleryError::InvalidObjectKey("key must not be blank".into()));
    }
    if key.len() > MAX_OBJECT_KEY_LEN {
        return Err(GalleryError::InvalidObjectKey(format!(
            "key longer than {} bytes",
            MAX_OBJECT_KEY_LEN
        )));
    }
    if key.starts_with('/')
        || key.ends_with('/')
        || key.contains("..")
        || key.contains("//")
        || key.split('/').any(|segment| segment == ".")
    {
        return Err(GalleryError::InvalidObjectKey(format!(
            "`{}` is not a valid path",
            key
        )));
    }
    if key.chars().any(|c| c.is_control() || c == '\\') {
        return Err(GalleryError::InvalidObjectKey(
            "key contains control characters or backslashes".into(),
        ));
    }
    Ok(())
}

/// Continuation tokens carry the last key returned, base64 encoded.
pub(crate) fn encode_continuation_token(last_key: &str) -> String {
    general_purpose::STANDARD.encode(last_key)
}

pub(crate) fn decode_continuation_token(token: &str) -> GalleryResult<String> {
    general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or(GalleryError::InvalidContinuationToken)
}

/// Slice one batch out of a key-ordered sequence, honoring the request's token.
pub(crate) fn select_batch<'a, I>(
    sorted_keys: I,
    request: &ListBatchRequest,
) -> GalleryResult<(Vec<&'a str>, Option<String>)>
where
    I: IntoIterator<Item = &'a str>,
{
    let start_after = request
        .continuation_token
        .as_deref()
        .map(decode_continuation_token)
        .transpose()?;
    let max_keys = request.max_keys.clamp(1, MAX_BATCH_SIZE);

    let mut remaining = sorted_keys
        .into_iter()
        .filter(|key| start_after.as_deref().is_none_or(|after| *key > after))
        .peekable();
    let batch: Vec<&str> = remaining.by_ref().take(max_keys).collect();
    let next = match (remaining.peek(), batch.last()) {
        (Some(_), Some(last)) => Some(encode_continuation_token(last)),
        _ => None,
    };
    Ok((batch, next))
}
