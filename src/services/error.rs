//! Error kinds shared by every gallery service component.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("invalid page request: {0}")]
    InvalidPageRequest(String),
    #[error("invalid object key: {0}")]
    InvalidObjectKey(String),
    #[error("unsupported content type `{0}`: only image files are allowed")]
    UnsupportedContentType(String),
    #[error("object `{0}` already exists; rename the file and try again")]
    DuplicateKey(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("continuation token is malformed")]
    InvalidContinuationToken,
    #[error("signature does not match")]
    InvalidSignature,
    #[error("signed url expired")]
    SignatureExpired,
    #[error("signed urls are not configured for this store")]
    SigningUnavailable,
    #[error("the indexed listing backend requires a metadata index")]
    IndexUnavailable,
    #[error("listing failed: {0}")]
    ListingFailed(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type GalleryResult<T> = Result<T, GalleryError>;

impl GalleryError {
    /// True for failures talking to the blob store or the index.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GalleryError::Sqlx(_) | GalleryError::Io(_) | GalleryError::ListingFailed(_)
        )
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
