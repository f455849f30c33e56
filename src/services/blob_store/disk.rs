//! DiskBlobStore: payloads on local disk, sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`.
//!
//! Writes go to `base_path/.staging` first and are published with a hard
//! link, which fails atomically when the key already exists. Listing returns
//! keys in ascending order: a first batch walks the bucket directory, and
//! continuation batches reuse that sorted snapshot until the next write or
//! delete through this store.

use super::{
    BlobEntry, BlobReader, BlobStore, ListBatch, ListBatchRequest, ensure_key_safe, select_batch,
};
use crate::services::{
    error::{GalleryError, GalleryResult},
    signer::UrlSigner,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    sync::RwLock,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const STAGING_DIR: &str = ".staging";

#[derive(Clone, Debug)]
pub struct DiskBlobStore {
    base_path: PathBuf,
    bucket: String,
    signer: Option<UrlSigner>,
    snapshot: Arc<KeySnapshot>,
}

/// Sorted keys from the latest directory walk, shared by clones of the store.
#[derive(Debug, Default)]
struct KeySnapshot {
    keys: RwLock<Option<Arc<Vec<String>>>>,
    walks: AtomicUsize,
}

impl DiskBlobStore {
    pub fn new(base_path: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            bucket: bucket.into(),
            signer: None,
            snapshot: Arc::new(KeySnapshot::default()),
        }
    }

    pub fn with_signer(mut self, signer: UrlSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    fn staging_dir(&self) -> PathBuf {
        self.base_path.join(STAGING_DIR)
    }

    /// Two-level shard identifiers: first two bytes of MD5(bucket/key) as hex.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(&self.bucket, key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Recover every stored key by walking the bucket directory.
    async fn collect_keys(&self) -> GalleryResult<Vec<String>> {
        let root = self.bucket_root();
        let mut keys = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Some(key) = self.key_from_path(&root, &path) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Keys for one batch: a fresh walk for first batches, the snapshot otherwise.
    async fn sorted_keys(&self, resuming: bool) -> GalleryResult<Arc<Vec<String>>> {
        if resuming {
            if let Some(keys) = self.snapshot.keys.read().await.clone() {
                return Ok(keys);
            }
        }
        let keys = Arc::new(self.collect_keys().await?);
        let walks = self.snapshot.walks.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(bucket = %self.bucket, keys = keys.len(), walks, "walked bucket directory");
        *self.snapshot.keys.write().await = Some(keys.clone());
        Ok(keys)
    }

    async fn invalidate_snapshot(&self) {
        *self.snapshot.keys.write().await = None;
    }

    fn key_from_path(&self, root: &Path, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Option<_>>()?;
        if parts.len() < 3 {
            return None;
        }
        let key = parts[2..].join("/");
        let (shard_a, shard_b) = Self::object_shards(&self.bucket, &key);
        (parts[0] == shard_a && parts[1] == shard_b).then_some(key)
    }

    async fn entry_for(&self, key: &str, path: &Path) -> GalleryResult<BlobEntry> {
        let metadata = fs::metadata(path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                GalleryError::ObjectNotFound(key.to_string())
            } else {
                GalleryError::Io(err)
            }
        })?;
        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(BlobEntry {
            key: key.to_string(),
            size_bytes: metadata.len() as i64,
            last_modified,
        })
    }

    async fn write_staged(&self, content: &[u8]) -> GalleryResult<PathBuf> {
        let staging = self.staging_dir();
        fs::create_dir_all(&staging).await?;
        let tmp_path = staging.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let written = async {
            file.write_all(content).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(GalleryError::Io(err));
        }
        Ok(tmp_path)
    }

    /// Recursively remove empty directories up to the bucket root.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_batch(&self, request: ListBatchRequest) -> GalleryResult<ListBatch> {
        let keys = self
            .sorted_keys(request.continuation_token.is_some())
            .await?;
        let (batch, next_continuation_token) =
            select_batch(keys.iter().map(String::as_str), &request)?;

        let mut entries = Vec::with_capacity(batch.len());
        for key in batch {
            match self.entry_for(key, &self.object_path(key)).await {
                Ok(entry) => entries.push(entry),
                // removed between the walk and the stat
                Err(GalleryError::ObjectNotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }

        debug!(
            bucket = %self.bucket,
            returned = entries.len(),
            truncated = next_continuation_token.is_some(),
            "listed batch"
        );
        Ok(ListBatch {
            entries,
            next_continuation_token,
        })
    }

    async fn exists(&self, key: &str) -> GalleryResult<bool> {
        ensure_key_safe(key)?;
        Ok(fs::try_exists(self.object_path(key)).await?)
    }

    async fn put_if_absent(
        &self,
        key: &str,
        _content_type: &str,
        content: Bytes,
    ) -> GalleryResult<BlobEntry> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            GalleryError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = self.write_staged(&content).await?;
        let linked = fs::hard_link(&tmp_path, &file_path).await;
        if let Err(err) = fs::remove_file(&tmp_path).await {
            debug!("failed to remove staged file {}: {}", tmp_path.display(), err);
        }
        match linked {
            Ok(()) => {
                self.invalidate_snapshot().await;
                self.entry_for(key, &file_path).await
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(GalleryError::DuplicateKey(key.to_string()))
            }
            Err(err) => Err(GalleryError::Io(err)),
        }
    }

    async fn get(&self, key: &str) -> GalleryResult<BlobReader> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                GalleryError::ObjectNotFound(key.to_string())
            } else {
                GalleryError::Io(err)
            }
        })?;
        let entry = self.entry_for(key, &file_path).await?;
        Ok(BlobReader {
            entry,
            body: ReaderStream::new(file).boxed(),
        })
    }

    async fn delete(&self, key: &str) -> GalleryResult<bool> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let removed = match fs::remove_file(&file_path).await {
            Ok(_) => {
                debug!("removed physical file {}", file_path.display());
                true
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
                false
            }
            Err(err) => return Err(GalleryError::Io(err)),
        };
        if removed {
            self.invalidate_snapshot().await;
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.bucket_root()).await;
        }
        Ok(removed)
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
        let tmp_path = self.write_staged(b"readyz").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read_back? != b"readyz" {
            return Err(GalleryError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "probe file content mismatch",
            )));
        }
        Ok(())
    }
}
