//! Access URL issuer: decorates listed records with a retrievable URL.
//!
//! The mode is fixed for the deployment. Static URLs never expire; signed
//! URLs are minted per read and stay valid for ten minutes.

use crate::services::{blob_store::BlobStore, error::GalleryResult};
use chrono::{Duration, Utc};
use std::sync::Arc;

pub const SIGNED_URL_TTL_SECS: i64 = 600;

#[derive(Clone)]
pub enum AccessUrlIssuer {
    /// `{base_url}/{key}`, e.g. `https://{bucket}.s3.{region}.amazonaws.com/{key}`.
    Public { base_url: String },
    /// Presigned by the blob store, read-only, one key.
    Signed { store: Arc<dyn BlobStore> },
}

impl AccessUrlIssuer {
    pub fn public(bucket: &str, store_domain: &str) -> Self {
        Self::public_with_base(format!("https://{}.{}", bucket, store_domain))
    }

    pub fn public_with_base(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self::Public { base_url }
    }

    pub fn signed(store: Arc<dyn BlobStore>) -> Self {
        Self::Signed { store }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Signed { .. })
    }

    pub fn issue(&self, key: &str) -> GalleryResult<String> {
        match self {
            Self::Public { base_url } => Ok(format!("{}/{}", base_url, key)),
            Self::Signed { store } => {
                store.presign_get(key, Utc::now() + Duration::seconds(SIGNED_URL_TTL_SECS))
            }
        }
    }
}

impl std::fmt::Debug for AccessUrlIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public { base_url } => {
                f.debug_struct("Public").field("base_url", base_url).finish()
            }
            Self::Signed { store } => f
                .debug_struct("Signed")
                .field("bucket", &store.bucket())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{blob_store::MemoryBlobStore, error::GalleryError, signer::UrlSigner};
    use url::Url;

    #[test]
    fn public_urls_are_deterministic() {
        let issuer = AccessUrlIssuer::public("photos", "s3.eu-west-1.amazonaws.com");
        let url = issuer.issue("2025/cat.png").unwrap();
        assert_eq!(url, "https://photos.s3.eu-west-1.amazonaws.com/2025/cat.png");
        assert_eq!(issuer.issue("2025/cat.png").unwrap(), url);
        assert!(!issuer.is_signed());
    }

    #[test]
    fn trailing_slash_on_base_is_ignored() {
        let issuer = AccessUrlIssuer::public_with_base("http://cdn.local/");
        assert_eq!(issuer.issue("a.png").unwrap(), "http://cdn.local/a.png");
    }

    #[test]
    fn signed_urls_expire_ten_minutes_out() {
        let signer = UrlSigner::new(b"secret".to_vec(), "http://localhost:3000/objects").unwrap();
        let store = Arc::new(MemoryBlobStore::new("gallery").with_signer(signer));
        let issuer = AccessUrlIssuer::signed(store.clone());

        let before = Utc::now();
        let url = Url::parse(&issuer.issue("a.png").unwrap()).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        let expires: i64 = pairs["expires"].parse().unwrap();
        let ttl = expires - before.timestamp();
        assert!((599..=601).contains(&ttl), "ttl was {}", ttl);

        store
            .verify_presigned("a.png", expires, &pairs["signature"])
            .unwrap();
        assert!(matches!(
            store.verify_presigned("b.png", expires, &pairs["signature"]),
            Err(GalleryError::InvalidSignature)
        ));
    }

    #[test]
    fn signed_mode_without_signer_fails() {
        let issuer = AccessUrlIssuer::signed(Arc::new(MemoryBlobStore::new("gallery")));
        assert!(matches!(
            issuer.issue("a.png"),
            Err(GalleryError::SigningUnavailable)
        ));
    }
}
