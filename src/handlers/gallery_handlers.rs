//! HTTP handlers for the gallery: page listing, upload, delete and download.
//! Storage and listing concerns are delegated to `GalleryService`.

use crate::{
    errors::AppError,
    models::{
        object::NewObject,
        page::{GalleryPage, PageRequest},
    },
    services::gallery_service::{GalleryService, SignedAccess},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Query params accepted by `GET /api/images`.
#[derive(Debug, Deserialize)]
pub struct ListImagesQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub search: Option<String>,
}

/// Query params carried by signed download URLs.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

/// `GET /api/images?page=&size=&search=`: one page plus pagination totals.
pub async fn list_images(
    State(service): State<GalleryService>,
    Query(q): Query<ListImagesQuery>,
) -> Result<Json<GalleryPage>, AppError> {
    let request = PageRequest::new(
        q.page.unwrap_or(1),
        q.size.unwrap_or(DEFAULT_PAGE_SIZE),
        q.search,
    )?;
    let page = service.page(&request).await?;
    Ok(Json(page))
}

/// `POST /api/images`: multipart form with a `file` part and an optional `description`.
pub async fn upload_image(
    State(service): State<GalleryService>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut file = None;
    let mut description = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed upload: {}", err)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let key = field.file_name().map(str::to_string).unwrap_or_default();
                let content_type = field.content_type().map(str::to_string);
                let content = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("reading file: {}", err)))?;
                file = Some((key, content_type, content));
            }
            Some("description") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("reading description: {}", err)))?;
                description = Some(text);
            }
            _ => {}
        }
    }

    let (key, content_type, content) =
        file.ok_or_else(|| AppError::bad_request("Upload failed: missing `file` part"))?;
    let record = service
        .upload(NewObject {
            key,
            content_type,
            description,
            content,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "File uploaded successfully!",
            "key": record.key,
        })),
    ))
}

/// `DELETE /api/images/{*key}`: remove blob and metadata; unknown keys succeed.
pub async fn delete_image(
    State(service): State<GalleryService>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = service.delete(&key).await?;
    Ok(Json(json!({
        "message": "Deleted successfully!",
        "blobRemoved": outcome.blob_removed,
        "metadataRemoved": outcome.metadata_removed,
    })))
}

/// `GET /objects/{*key}`: stream the payload; signed deployments check the URL signature.
pub async fn download_object(
    State(service): State<GalleryService>,
    Path(key): Path<String>,
    Query(q): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let access = match (q.expires, q.signature) {
        (Some(expires), Some(signature)) => Some(SignedAccess { expires, signature }),
        _ => None,
    };
    let download = service.open_object(&key, access).await?;
    let size_bytes = download.reader.entry.size_bytes.max(0);

    let mut response = Response::new(Body::from_stream(download.reader.body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&download.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size_bytes));
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}
