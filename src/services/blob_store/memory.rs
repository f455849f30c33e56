//! In-process blob store keeping payloads in an ordered map.
//!
//! Enumerates in ascending key order like S3. The batch size can be lowered
//! below `MAX_BATCH_SIZE` to exercise multi-batch walks.

use super::{
    BlobEntry, BlobReader, BlobStore, ListBatch, ListBatchRequest, MAX_BATCH_SIZE, ensure_key_safe,
    select_batch,
};
use crate::services::{
    error::{GalleryError, GalleryResult},
    signer::UrlSigner,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use std::{
    collections::BTreeMap,
    io,
    sync::atomic::{AtomicUsize, Ordering},
};
use tokio::sync::RwLock;

#[derive(Debug)]
pub struct MemoryBlobStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, (BlobEntry, Bytes)>>,
    batch_size: usize,
    list_calls: AtomicUsize,
    fail_listing_after: Option<usize>,
    fail_deletes: bool,
    signer: Option<UrlSigner>,
}

impl MemoryBlobStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            batch_size: MAX_BATCH_SIZE,
            list_calls: AtomicUsize::new(0),
            fail_listing_after: None,
            fail_deletes: false,
            signer: None,
        }
    }

    #[cfg(test)]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn with_signer(mut self, signer: UrlSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Make every listing call after the first `calls` fail with a transport error.
    #[cfg(test)]
    pub fn with_listing_failure_after(mut self, calls: usize) -> Self {
        self.fail_listing_after = Some(calls);
        self
    }

    /// Make every delete fail with a transport error.
    #[cfg(test)]
    pub fn with_delete_failure(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    /// Number of `list_batch` calls served so far.
    #[cfg(test)]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_batch(&self, request: ListBatchRequest) -> GalleryResult<ListBatch> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing_after.is_some_and(|limit| call >= limit) {
            return Err(GalleryError::ListingFailed(format!(
                "bucket `{}` unreachable",
                self.bucket
            )));
        }

        let request = ListBatchRequest {
            max_keys: request.max_keys.min(self.batch_size),
            ..request
        };
        let objects = self.objects.read().await;
        let (keys, next_continuation_token) =
            select_batch(objects.keys().map(String::as_str), &request)?;
        let entries = keys
            .into_iter()
            .filter_map(|key| objects.get(key).map(|(entry, _)| entry.clone()))
            .collect();

        Ok(ListBatch {
            entries,
            next_continuation_token,
        })
    }

    async fn exists(&self, key: &str) -> GalleryResult<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn put_if_absent(
        &self,
        key: &str,
        _content_type: &str,
        content: Bytes,
    ) -> GalleryResult<BlobEntry> {
        ensure_key_safe(key)?;
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(GalleryError::DuplicateKey(key.to_string()));
        }
        let entry = BlobEntry {
            key: key.to_string(),
            size_bytes: content.len() as i64,
            last_modified: Utc::now(),
        };
        objects.insert(key.to_string(), (entry.clone(), content));
        Ok(entry)
    }

    async fn get(&self, key: &str) -> GalleryResult<BlobReader> {
        let objects = self.objects.read().await;
        let (entry, content) = objects
            .get(key)
            .cloned()
            .ok_or_else(|| GalleryError::ObjectNotFound(key.to_string()))?;
        Ok(BlobReader {
            entry,
            body: stream::once(async move { Ok::<_, io::Error>(content) }).boxed(),
        })
    }

    async fn delete(&self, key: &str) -> GalleryResult<bool> {
        if self.fail_deletes {
            return Err(GalleryError::Io(io::Error::other(format!(
                "bucket `{}` refused delete",
                self.bucket
            ))));
        }
        Ok(self.objects.write().await.remove(key).is_some())
    }

    fn presign_get(&self, key: &str, expires_at: DateTime<Utc>) -> GalleryResult<String> {
        self.signer
            .as_ref()
            .ok_or(GalleryError::SigningUnavailable)?
            .presign(key, expires_at)
    }

    fn verify_presigned(&self, key: &str, expires: i64, signature: &str) -> GalleryResult<()> {
        self.signer
            .as_ref()
            .ok_or(GalleryError::SigningUnavailable)?
            .verify(key, expires, signature, Utc::now())
    }

    async fn probe(&self) -> GalleryResult<()> {
        Ok(())
    }
}
