//! Represents an image stored in the gallery.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata for a single stored object.
///
/// The payload itself lives in the blob store; this struct never carries
/// content bytes. The access URL is not stored either, it is issued per read.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    /// Unique key within the store, doubling as the storage path.
    pub key: String,

    /// Display name: the last path segment of `key`.
    pub file_name: String,

    /// MIME type recorded at upload time. Unknown for blob-only listings.
    pub content_type: Option<String>,

    /// Payload size in bytes.
    pub size_bytes: i64,

    /// Free-text description. Unknown for blob-only listings.
    pub description: Option<String>,

    /// When the object was created; default freshness ordering key.
    pub upload_timestamp: DateTime<Utc>,
}

impl ObjectRecord {
    pub fn new(
        key: impl Into<String>,
        content_type: Option<String>,
        size_bytes: i64,
        description: Option<String>,
        upload_timestamp: DateTime<Utc>,
    ) -> Self {
        let key = key.into();
        Self {
            file_name: file_name_of(&key).to_string(),
            key,
            content_type,
            size_bytes,
            description,
            upload_timestamp,
        }
    }
}

/// Substring of `key` after the last `/`, or `key` itself.
pub fn file_name_of(key: &str) -> &str {
    key.rsplit_once('/').map(|(_, name)| name).unwrap_or(key)
}

/// One item of a rendered gallery page.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    pub url: String,
    pub file_name: String,
    pub key: String,
    pub description: String,
}

impl ImageData {
    pub fn from_record(record: ObjectRecord, url: String) -> Self {
        Self {
            url,
            file_name: record.file_name,
            key: record.key,
            description: record.description.unwrap_or_default(),
        }
    }
}

/// Upload input as handed over by the HTTP layer.
#[derive(Clone, Debug)]
pub struct NewObject {
    pub key: String,
    pub content_type: Option<String>,
    pub description: Option<String>,
    pub content: Bytes,
}
