//! Page requests and the page payload handed to the presentation layer.

use crate::{
    models::object::ImageData,
    services::error::{GalleryError, GalleryResult},
};
use serde::Serialize;

/// A validated request for one page of results.
///
/// `page_number` and `page_size` are both at least 1. A blank search term is
/// normalised to `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    page_number: u32,
    page_size: u32,
    search: Option<String>,
}

impl PageRequest {
    pub fn new(page_number: i64, page_size: i64, search: Option<String>) -> GalleryResult<Self> {
        if page_number < 1 {
            return Err(GalleryError::InvalidPageRequest(format!(
                "page number must be at least 1, got {}",
                page_number
            )));
        }
        let page_size = validate_page_size(page_size)?;
        let page_number = u32::try_from(page_number).map_err(|_| {
            GalleryError::InvalidPageRequest(format!("page number {} is too large", page_number))
        })?;

        Ok(Self {
            page_number,
            page_size,
            search: search.filter(|s| !s.trim().is_empty()),
        })
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    /// Number of matching records preceding this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page_number - 1) * u64::from(self.page_size)
    }
}

/// Reject non-positive page sizes before any store access.
pub fn validate_page_size(page_size: i64) -> GalleryResult<u32> {
    if page_size < 1 {
        return Err(GalleryError::InvalidPageRequest(format!(
            "page size must be at least 1, got {}",
            page_size
        )));
    }
    u32::try_from(page_size).map_err(|_| {
        GalleryError::InvalidPageRequest(format!("page size {} is too large", page_size))
    })
}

/// `ceil(matching / page_size)`, saturating at `u32::MAX`.
pub fn page_count(matching: u64, page_size: u32) -> u32 {
    let pages = matching.div_ceil(u64::from(page_size.max(1)));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Page payload returned by `GET /api/images`.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GalleryPage {
    pub items: Vec<ImageData>,
    pub current_page: u32,
    pub total_pages: u32,
    pub size_used: u32,
    #[serde(rename = "searchTermEchoed")]
    pub search: Option<String>,
    pub page_numbers: Vec<u32>,
}

impl GalleryPage {
    pub fn new(request: &PageRequest, items: Vec<ImageData>, total_pages: u32) -> Self {
        Self {
            items,
            current_page: request.page_number(),
            total_pages,
            size_used: request.page_size(),
            search: request.search().map(str::to_string),
            page_numbers: (1..=total_pages).collect(),
        }
    }
}
