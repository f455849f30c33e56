//! Streaming early-stop pagination over the cursor walker.
//!
//! Cost for page k is proportional to the matching records up to the end of
//! page k; the walk is dropped as soon as the page is full. Correct only while
//! the store's enumeration order is stable between calls.

use super::ListingBackend;
use crate::{
    models::{object::ObjectRecord, page::PageRequest},
    services::{
        blob_store::BlobStore, cursor::walk_batches, error::GalleryResult, filter::SearchTerm,
    },
};
use async_trait::async_trait;
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::debug;

pub struct CursorWalkListing {
    store: Arc<dyn BlobStore>,
}

impl CursorWalkListing {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ListingBackend for CursorWalkListing {
    fn name(&self) -> &'static str {
        "cursor"
    }

    async fn list_page(&self, request: &PageRequest) -> GalleryResult<Vec<ObjectRecord>> {
        let term = SearchTerm::new(request.search());
        let page_size = request.page_size() as usize;
        let mut skip = request.offset();
        let mut items = Vec::with_capacity(page_size);
        let mut batches = walk_batches(self.store.as_ref());
        let mut examined = 0usize;

        'walk: while let Some(batch) = batches.try_next().await? {
            for entry in batch {
                examined += 1;
                let record = ObjectRecord::from(entry);
                if !term.matches(&record) {
                    continue;
                }
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                items.push(record);
                if items.len() >= page_size {
                    break 'walk;
                }
            }
        }

        debug!(
            page = request.page_number(),
            examined,
            returned = items.len(),
            "cursor walk page assembled"
        );
        Ok(items)
    }

    async fn count_matching(&self, search: Option<&str>) -> GalleryResult<u64> {
        let term = SearchTerm::new(search);
        let mut batches = walk_batches(self.store.as_ref());
        let mut total = 0u64;
        while let Some(batch) = batches.try_next().await? {
            total += batch
                .into_iter()
                .map(ObjectRecord::from)
                .filter(|record| term.matches(record))
                .count() as u64;
        }
        Ok(total)
    }
}
