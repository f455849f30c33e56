//! Listing straight from the metadata index: native filter, offset and limit.

use super::ListingBackend;
use crate::{
    models::{object::ObjectRecord, page::PageRequest},
    services::{error::GalleryResult, metadata_index::MetadataIndex},
};
use async_trait::async_trait;

pub struct IndexedListing {
    index: MetadataIndex,
}

impl IndexedListing {
    pub fn new(index: MetadataIndex) -> Self {
        Self { index }
    }
}

#[async_trait]
impl ListingBackend for IndexedListing {
    fn name(&self) -> &'static str {
        "indexed"
    }

    async fn list_page(&self, request: &PageRequest) -> GalleryResult<Vec<ObjectRecord>> {
        self.index
            .query(request.search(), request.offset(), request.page_size())
            .await
    }

    async fn count_matching(&self, search: Option<&str>) -> GalleryResult<u64> {
        self.index.count(search).await
    }
}
