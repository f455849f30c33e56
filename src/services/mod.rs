//! Service layer: blob stores, listing backends, the metadata index and the
//! gallery operations built on top of them.

pub mod blob_store;
pub mod cursor;
pub mod error;
pub mod filter;
pub mod gallery_service;
pub mod listing;
pub mod metadata_index;
pub mod signer;
pub mod url_issuer;
