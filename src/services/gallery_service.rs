//! GalleryService: the operations behind the HTTP surface.
//!
//! - list one page of images, decorated with access URLs
//! - count pages for the same search
//! - upload (image content types only, no overwrites)
//! - delete (blob and metadata, each best-effort)
//! - open an object for download, checking signatures in signed mode
//!
//! The blob store, listing backend, optional metadata index and URL issuer
//! are all chosen at construction time.

use crate::{
    models::{
        object::{ImageData, NewObject, ObjectRecord},
        page::{GalleryPage, PageRequest, page_count, validate_page_size},
    },
    services::{
        blob_store::{BlobReader, BlobStore, ensure_key_safe},
        error::{GalleryError, GalleryResult},
        listing::ListingBackend,
        metadata_index::MetadataIndex,
        url_issuer::AccessUrlIssuer,
    },
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone)]
pub struct GalleryService {
    store: Arc<dyn BlobStore>,
    listing: Arc<dyn ListingBackend>,
    index: Option<MetadataIndex>,
    urls: AccessUrlIssuer,
}

/// What a delete actually removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub blob_removed: bool,
    pub metadata_removed: bool,
}

/// Query parameters of a signed download URL.
#[derive(Debug, Clone)]
pub struct SignedAccess {
    pub expires: i64,
    pub signature: String,
}

pub struct ObjectDownload {
    pub content_type: String,
    pub reader: BlobReader,
}

impl GalleryService {
    pub fn new(
        store: Arc<dyn BlobStore>,
        listing: Arc<dyn ListingBackend>,
        index: Option<MetadataIndex>,
        urls: AccessUrlIssuer,
    ) -> Self {
        Self {
            store,
            listing,
            index,
            urls,
        }
    }

    pub fn store(&self) -> &dyn BlobStore {
        self.store.as_ref()
    }

    pub fn index(&self) -> Option<&MetadataIndex> {
        self.index.as_ref()
    }

    /// Matching records for one page, each with a freshly issued URL.
    pub async fn list_page(&self, request: &PageRequest) -> GalleryResult<Vec<ImageData>> {
        let records = self.listing.list_page(request).await?;
        records
            .into_iter()
            .map(|record| {
                self.urls
                    .issue(&record.key)
                    .map(|url| ImageData::from_record(record, url))
            })
            .collect()
    }

    /// `ceil(matching / page_size)` using the listing backend's own count.
    pub async fn total_pages(&self, page_size: i64, search: Option<&str>) -> GalleryResult<u32> {
        let page_size = validate_page_size(page_size)?;
        let matching = self.listing.count_matching(search).await?;
        Ok(page_count(matching, page_size))
    }

    /// Page items plus pagination controls in one payload.
    pub async fn page(&self, request: &PageRequest) -> GalleryResult<GalleryPage> {
        let items = self.list_page(request).await?;
        let total_pages = self
            .total_pages(i64::from(request.page_size()), request.search())
            .await?;
        Ok(GalleryPage::new(request, items, total_pages))
    }

    /// Store a new image. Fails with `DuplicateKey` instead of overwriting.
    ///
    /// With an index, the metadata row is claimed first so the UNIQUE
    /// constraint settles races between concurrent uploads of one key; the
    /// row is released again if the blob write fails.
    pub async fn upload(&self, new: NewObject) -> GalleryResult<ObjectRecord> {
        ensure_key_safe(&new.key)?;
        let content_type = match new.content_type.as_deref() {
            Some(ct) if ct.starts_with("image/") => ct.to_string(),
            other => {
                return Err(GalleryError::UnsupportedContentType(
                    other.unwrap_or("none").to_string(),
                ));
            }
        };

        let record = ObjectRecord::new(
            new.key.clone(),
            Some(content_type.clone()),
            new.content.len() as i64,
            Some(new.description.unwrap_or_default()),
            Utc::now(),
        );

        match &self.index {
            Some(index) => {
                if index.find_by_key(&record.key).await?.is_some() {
                    return Err(GalleryError::DuplicateKey(record.key));
                }
                index.insert(&record).await?;
                if let Err(err) = self
                    .store
                    .put_if_absent(&record.key, &content_type, new.content)
                    .await
                {
                    if let Err(cleanup) = index.delete_by_key(&record.key).await {
                        warn!(key = %record.key, error = %cleanup, "failed to release metadata after blob write error");
                    }
                    return Err(err);
                }
            }
            None => {
                if self.store.exists(&record.key).await? {
                    return Err(GalleryError::DuplicateKey(record.key));
                }
                self.store
                    .put_if_absent(&record.key, &content_type, new.content)
                    .await?;
            }
        }

        info!(key = %record.key, size_bytes = record.size_bytes, "uploaded image");
        Ok(record)
    }

    /// Remove the blob and its metadata row. Missing pieces are not errors.
    ///
    /// Both removals are attempted; the first failure is returned afterwards.
    pub async fn delete(&self, key: &str) -> GalleryResult<DeleteOutcome> {
        ensure_key_safe(key)?;
        let blob = self.store.delete(key).await;
        if let Err(err) = &blob {
            warn!(key, error = %err, "blob delete failed, still removing metadata");
        }
        let metadata = match &self.index {
            Some(index) => index.delete_by_key(key).await,
            None => Ok(false),
        };
        let blob_removed = blob?;
        let metadata_removed = metadata?;

        if self.index.is_some() && blob_removed != metadata_removed {
            warn!(
                key,
                blob_removed, metadata_removed, "partial delete: blob and metadata were out of sync"
            );
        }
        info!(key, blob_removed, metadata_removed, "deleted image");
        Ok(DeleteOutcome {
            blob_removed,
            metadata_removed,
        })
    }

    /// Open an object for streaming. Signed deployments require valid access parameters.
    pub async fn open_object(
        &self,
        key: &str,
        access: Option<SignedAccess>,
    ) -> GalleryResult<ObjectDownload> {
        ensure_key_safe(key)?;
        if self.urls.is_signed() {
            let access = access.ok_or(GalleryError::InvalidSignature)?;
            self.store
                .verify_presigned(key, access.expires, &access.signature)?;
        }

        let reader = self.store.get(key).await?;
        let content_type = match &self.index {
            Some(index) => index
                .find_by_key(key)
                .await?
                .and_then(|record| record.content_type),
            None => None,
        }
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        Ok(ObjectDownload {
            content_type,
            reader,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        config::ListingKind,
        services::{
            blob_store::MemoryBlobStore, listing, metadata_index::tests::memory_index,
            signer::UrlSigner,
        },
    };
    use bytes::Bytes;
    use futures::StreamExt;
    use url::Url;

    pub(crate) async fn service_with(
        kind: ListingKind,
        store: Arc<MemoryBlobStore>,
        with_index: bool,
        urls: AccessUrlIssuer,
    ) -> GalleryService {
        let index = if with_index {
            Some(memory_index().await)
        } else {
            None
        };
        let listing = listing::build(kind, store.clone(), index.clone()).unwrap();
        GalleryService::new(store, listing, index, urls)
    }

    pub(crate) async fn indexed_service() -> GalleryService {
        service_with(
            ListingKind::Indexed,
            Arc::new(MemoryBlobStore::new("gallery")),
            true,
            AccessUrlIssuer::public("gallery", "s3.us-east-1.amazonaws.com"),
        )
        .await
    }

    pub(crate) fn image(key: &str, description: Option<&str>) -> NewObject {
        NewObject {
            key: key.to_string(),
            content_type: Some("image/png".into()),
            description: description.map(str::to_string),
            content: Bytes::from_static(b"\x89PNG"),
        }
    }

    fn request(page: i64, size: i64, search: Option<&str>) -> PageRequest {
        PageRequest::new(page, size, search.map(str::to_string)).unwrap()
    }

    #[tokio::test]
    async fn upload_list_delete_round_trip() {
        for kind in [ListingKind::Cursor, ListingKind::Scan, ListingKind::Indexed] {
            let service = service_with(
                kind,
                Arc::new(MemoryBlobStore::new("gallery")),
                true,
                AccessUrlIssuer::public("gallery", "s3.us-east-1.amazonaws.com"),
            )
            .await;
            service.upload(image("other.png", None)).await.unwrap();
            service.upload(image("holiday/k.png", Some("x"))).await.unwrap();

            let items = service
                .list_page(&request(1, 10, Some("holiday/k.png")))
                .await
                .unwrap();
            assert_eq!(items.len(), 1, "{:?}", kind);
            assert_eq!(items[0].key, "holiday/k.png");
            assert_eq!(items[0].file_name, "k.png");
            assert_eq!(
                items[0].url,
                "https://gallery.s3.us-east-1.amazonaws.com/holiday/k.png"
            );

            let outcome = service.delete("holiday/k.png").await.unwrap();
            assert_eq!(
                outcome,
                DeleteOutcome {
                    blob_removed: true,
                    metadata_removed: true
                }
            );
            let items = service
                .list_page(&request(1, 10, Some("holiday/k.png")))
                .await
                .unwrap();
            assert!(items.is_empty(), "{:?}", kind);
        }
    }

    #[tokio::test]
    async fn duplicate_upload_keeps_existing_metadata() {
        let service = indexed_service().await;
        service
            .upload(image("cat.png", Some("original")))
            .await
            .unwrap();
        let err = service
            .upload(image("cat.png", Some("replacement")))
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::DuplicateKey(_)));

        let stored = service
            .index()
            .unwrap()
            .find_by_key("cat.png")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.description.as_deref(), Some("original"));
    }

    #[tokio::test]
    async fn duplicate_upload_without_index_is_rejected() {
        let service = service_with(
            ListingKind::Cursor,
            Arc::new(MemoryBlobStore::new("gallery")),
            false,
            AccessUrlIssuer::public("gallery", "example.com"),
        )
        .await;
        service.upload(image("cat.png", None)).await.unwrap();
        assert!(matches!(
            service.upload(image("cat.png", None)).await,
            Err(GalleryError::DuplicateKey(_))
        ));
    }

    #[tokio::test]
    async fn stray_blob_blocks_upload_and_releases_metadata() {
        let store = Arc::new(MemoryBlobStore::new("gallery"));
        store
            .put_if_absent("orphan.png", "image/png", Bytes::from_static(b"x"))
            .await
            .unwrap();
        let service = service_with(
            ListingKind::Indexed,
            store,
            true,
            AccessUrlIssuer::public("gallery", "example.com"),
        )
        .await;

        let err = service.upload(image("orphan.png", None)).await.unwrap_err();
        assert!(matches!(err, GalleryError::DuplicateKey(_)));
        assert!(
            service
                .index()
                .unwrap()
                .find_by_key("orphan.png")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn validation_happens_before_store_access() {
        let store = Arc::new(MemoryBlobStore::new("gallery"));
        let service = service_with(
            ListingKind::Cursor,
            store.clone(),
            false,
            AccessUrlIssuer::public("gallery", "example.com"),
        )
        .await;

        let mut pdf = image("doc.pdf", None);
        pdf.content_type = Some("application/pdf".into());
        assert!(matches!(
            service.upload(pdf).await,
            Err(GalleryError::UnsupportedContentType(_))
        ));
        assert!(matches!(
            service.upload(image("  ", None)).await,
            Err(GalleryError::InvalidObjectKey(_))
        ));
        assert!(matches!(
            service.upload(image("a/./b.png", None)).await,
            Err(GalleryError::InvalidObjectKey(_))
        ));
        assert!(matches!(
            service.total_pages(0, None).await,
            Err(GalleryError::InvalidPageRequest(_))
        ));
        assert_eq!(store.list_calls(), 0);
        assert!(!store.exists("doc.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn delete_of_unknown_key_is_a_no_op() {
        let service = indexed_service().await;
        let outcome = service.delete("missing.png").await.unwrap();
        assert!(!outcome.blob_removed);
        assert!(!outcome.metadata_removed);
    }

    #[tokio::test]
    async fn failed_blob_delete_still_removes_metadata() {
        let store = Arc::new(MemoryBlobStore::new("gallery").with_delete_failure());
        let service = service_with(
            ListingKind::Indexed,
            store.clone(),
            true,
            AccessUrlIssuer::public("gallery", "s3.us-east-1.amazonaws.com"),
        )
        .await;
        service.upload(image("a.png", None)).await.unwrap();

        let err = service.delete("a.png").await.unwrap_err();
        assert!(err.is_transport());
        let index = service.index().unwrap();
        assert!(index.find_by_key("a.png").await.unwrap().is_none());
        assert!(store.exists("a.png").await.unwrap());
    }

    #[tokio::test]
    async fn non_ascii_keys_are_found_by_every_backend() {
        for kind in [ListingKind::Cursor, ListingKind::Scan, ListingKind::Indexed] {
            let service = service_with(
                kind,
                Arc::new(MemoryBlobStore::new("gallery")),
                true,
                AccessUrlIssuer::public("gallery", "s3.us-east-1.amazonaws.com"),
            )
            .await;
            service.upload(image("Ägypten.png", None)).await.unwrap();
            service.upload(image("other.png", None)).await.unwrap();

            for term in ["Ägypten.png", "ägypten", "ÄGYPTEN.PNG"] {
                let page = service.page(&request(1, 10, Some(term))).await.unwrap();
                assert_eq!(page.items.len(), 1, "{:?} {}", kind, term);
                assert_eq!(page.items[0].key, "Ägypten.png");
                assert_eq!(page.total_pages, 1, "{:?} {}", kind, term);
            }
        }
    }

    #[tokio::test]
    async fn page_payload_combines_items_and_totals() {
        let store = Arc::new(MemoryBlobStore::new("gallery"));
        let service = service_with(
            ListingKind::Cursor,
            store,
            false,
            AccessUrlIssuer::public("gallery", "example.com"),
        )
        .await;
        for key in ["a.png", "b.jpg", "abc.png"] {
            service.upload(image(key, None)).await.unwrap();
        }

        let page = service.page(&request(2, 2, None)).await.unwrap();
        let keys: Vec<_> = page.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["b.jpg"]);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.page_numbers, vec![1, 2]);

        let beyond = service.page(&request(7, 2, None)).await.unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_pages, 2);
    }

    #[tokio::test]
    async fn listing_failure_surfaces_as_error() {
        let store = Arc::new(MemoryBlobStore::new("gallery").with_listing_failure_after(0));
        let service = service_with(
            ListingKind::Scan,
            store,
            false,
            AccessUrlIssuer::public("gallery", "example.com"),
        )
        .await;
        let err = service.page(&request(1, 10, None)).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn signed_downloads_require_a_valid_signature() {
        let signer = UrlSigner::new(b"secret".to_vec(), "http://localhost:3000/objects").unwrap();
        let store = Arc::new(MemoryBlobStore::new("gallery").with_signer(signer));
        let service = service_with(
            ListingKind::Indexed,
            store.clone(),
            true,
            AccessUrlIssuer::signed(store),
        )
        .await;
        service.upload(image("cat.png", None)).await.unwrap();

        let items = service.list_page(&request(1, 10, None)).await.unwrap();
        let url = Url::parse(&items[0].url).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        let access = SignedAccess {
            expires: pairs["expires"].parse().unwrap(),
            signature: pairs["signature"].clone(),
        };

        let mut download = service
            .open_object("cat.png", Some(access.clone()))
            .await
            .unwrap();
        assert_eq!(download.content_type, "image/png");
        let body = download.reader.body.next().await.unwrap().unwrap();
        assert_eq!(&body[..], b"\x89PNG");

        assert!(matches!(
            service.open_object("cat.png", None).await,
            Err(GalleryError::InvalidSignature)
        ));
        let forged = SignedAccess {
            signature: "AAAA".into(),
            ..access
        };
        assert!(matches!(
            service.open_object("cat.png", Some(forged)).await,
            Err(GalleryError::InvalidSignature)
        ));
    }
}
