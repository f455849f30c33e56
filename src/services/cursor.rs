//! Cursor walker over a blob store's bounded listing calls.
//!
//! `walk_batches` turns the token-chained `list_batch` calls into a lazy,
//! forward-only stream. Each batch is requested only when the consumer polls
//! for it, so dropping the stream early stops the walk. Errors end the stream
//! and are not retried.

use crate::services::{
    blob_store::{BlobEntry, BlobStore, ListBatchRequest},
    error::{GalleryError, GalleryResult},
};
use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use tracing::debug;

enum Cursor {
    Start,
    Resume(String),
    Exhausted,
}

pub fn walk_batches<'a>(store: &'a dyn BlobStore) -> BoxStream<'a, GalleryResult<Vec<BlobEntry>>> {
    stream::try_unfold(Cursor::Start, move |cursor| async move {
        let request = match cursor {
            Cursor::Exhausted => return Ok(None),
            Cursor::Start => ListBatchRequest::first(),
            Cursor::Resume(token) => ListBatchRequest::after(token),
        };

        let batch = store.list_batch(request).await?;
        debug!(
            bucket = store.bucket(),
            entries = batch.entries.len(),
            more = batch.next_continuation_token.is_some(),
            "cursor advanced"
        );

        let next = match batch.next_continuation_token {
            Some(token) => Cursor::Resume(token),
            None => Cursor::Exhausted,
        };
        Ok::<_, GalleryError>(Some((batch.entries, next)))
    })
    .boxed()
}

/// Walk the whole store and collect every entry in store order.
pub async fn collect_all(store: &dyn BlobStore) -> GalleryResult<Vec<BlobEntry>> {
    walk_batches(store).try_concat().await
}
