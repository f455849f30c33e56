//! Core data models for the image gallery.
//!
//! `ObjectRecord` maps onto the `images` table of the metadata index via
//! `sqlx::FromRow`; page types serialize as JSON via `serde`.

pub mod object;
pub mod page;
