//! Listing backends: one interface, three ways of turning a store into
//! offset-addressable, filtered pages.
//!
//! - `CursorWalkListing` streams cursor batches and stops once the page is full.
//! - `ExhaustiveScanListing` walks the whole store, filters, then slices.
//! - `IndexedListing` pushes filter, offset and limit into the metadata index.
//!
//! Each backend counts matches with the same enumeration and filter it uses
//! for pages, so `total_pages` and page contents agree on a static store.

mod indexed;
mod scan;
mod streaming;

pub use indexed::IndexedListing;
pub use scan::ExhaustiveScanListing;
pub use streaming::CursorWalkListing;

use crate::{
    config::ListingKind,
    models::{object::ObjectRecord, page::PageRequest},
    services::{
        blob_store::{BlobEntry, BlobStore},
        error::{GalleryError, GalleryResult},
        metadata_index::MetadataIndex,
    },
};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ListingBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Matching records for one page, at most `page_size` of them.
    async fn list_page(&self, request: &PageRequest) -> GalleryResult<Vec<ObjectRecord>>;

    /// Number of records matching `search` across the whole store.
    async fn count_matching(&self, search: Option<&str>) -> GalleryResult<u64>;
}

/// Select the backend once, at construction time.
pub fn build(
    kind: ListingKind,
    store: Arc<dyn BlobStore>,
    index: Option<MetadataIndex>,
) -> GalleryResult<Arc<dyn ListingBackend>> {
    let backend: Arc<dyn ListingBackend> = match kind {
        ListingKind::Cursor => Arc::new(CursorWalkListing::new(store)),
        ListingKind::Scan => Arc::new(ExhaustiveScanListing::new(store)),
        ListingKind::Indexed => Arc::new(IndexedListing::new(
            index.ok_or(GalleryError::IndexUnavailable)?,
        )),
    };
    Ok(backend)
}

impl From<BlobEntry> for ObjectRecord {
    fn from(entry: BlobEntry) -> Self {
        ObjectRecord::new(entry.key, None, entry.size_bytes, None, entry.last_modified)
    }
}
