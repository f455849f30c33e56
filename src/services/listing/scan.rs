//! Exhaustive-then-slice pagination.
//!
//! Every call walks the whole store once, filters the full set and slices the
//! requested window out of it. O(store size) per call regardless of page.

use super::ListingBackend;
use crate::{
    models::{object::ObjectRecord, page::PageRequest},
    services::{
        blob_store::BlobStore, cursor::collect_all, error::GalleryResult, filter::SearchTerm,
    },
};
use async_trait::async_trait;
use std::sync::Arc;

pub struct ExhaustiveScanListing {
    store: Arc<dyn BlobStore>,
}

impl ExhaustiveScanListing {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    async fn matching(&self, search: Option<&str>) -> GalleryResult<Vec<ObjectRecord>> {
        let term = SearchTerm::new(search);
        let entries = collect_all(self.store.as_ref()).await?;
        Ok(entries
            .into_iter()
            .map(ObjectRecord::from)
            .filter(|record| term.matches(record))
            .collect())
    }
}

#[async_trait]
impl ListingBackend for ExhaustiveScanListing {
    fn name(&self) -> &'static str {
        "scan"
    }

    async fn list_page(&self, request: &PageRequest) -> GalleryResult<Vec<ObjectRecord>> {
        let matching = self.matching(request.search()).await?;
        let start = usize::try_from(request.offset())
            .unwrap_or(usize::MAX)
            .min(matching.len());
        let end = start
            .saturating_add(request.page_size() as usize)
            .min(matching.len());
        Ok(matching[start..end].to_vec())
    }

    async fn count_matching(&self, search: Option<&str>) -> GalleryResult<u64> {
        Ok(self.matching(search).await?.len() as u64)
    }
}
