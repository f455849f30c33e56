//! Defines routes for the gallery.
//!
//! ## Structure
//! - **Gallery API**
//!   - `GET    /api/images`: one page of images (supports page, size, search)
//!   - `POST   /api/images`: multipart upload (`file`, `description`)
//!   - `DELETE /api/images/{*key}`: delete image and metadata
//!
//! - **Objects**
//!   - `GET    /objects/{*key}`: download payload (signature checked in signed mode)
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        gallery_handlers::{delete_image, download_object, list_images, upload_image},
        health_handlers::{healthz, readyz},
    },
    services::gallery_service::GalleryService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get},
};

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Build and return the router for all gallery routes.
///
/// The router carries shared state (`GalleryService`) to all handlers.
pub fn routes() -> Router<GalleryService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/api/images",
            get(list_images)
                .post(upload_image)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/images/{*key}", delete(delete_image))
        .route("/objects/{*key}", get(download_object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gallery_service::tests::{image, indexed_service};
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let app = routes().with_state(indexed_service().await);
        let (status, body) = call(app, get_request("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readyz_checks_index_and_store() {
        let app = routes().with_state(indexed_service().await);
        let (status, body) = call(app, get_request("/readyz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["index"]["ok"], true);
        assert_eq!(body["checks"]["blob_store"]["ok"], true);
    }

    #[tokio::test]
    async fn lists_a_page_as_json() {
        let service = indexed_service().await;
        for key in ["a.png", "b.jpg", "abc.png"] {
            service.upload(image(key, None)).await.unwrap();
        }
        let app = routes().with_state(service);

        let (status, body) = call(app, get_request("/api/images?page=1&size=10&search=png")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currentPage"], 1);
        assert_eq!(body["totalPages"], 1);
        assert_eq!(body["sizeUsed"], 10);
        assert_eq!(body["searchTermEchoed"], "png");
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0]["url"].as_str().unwrap().starts_with("https://gallery."));
    }

    #[tokio::test]
    async fn invalid_page_size_is_a_bad_request() {
        let app = routes().with_state(indexed_service().await);
        let (status, body) = call(app, get_request("/api/images?size=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("page size"));
    }

    #[tokio::test]
    async fn multipart_upload_then_delete() {
        let service = indexed_service().await;
        let app = routes().with_state(service.clone());

        let boundary = "gallery-boundary";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"description\"\r\n\r\nA sleepy cat\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"cat.png\"\r\n\
             Content-Type: image/png\r\n\r\nPNGDATA\r\n--{b}--\r\n",
            b = boundary
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/images")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, body) = call(app.clone(), request).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["key"], "cat.png");

        let (_, page) = call(app.clone(), get_request("/api/images?search=sleepy")).await;
        assert_eq!(page["items"][0]["description"], "A sleepy cat");

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/images/cat.png")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["blobRemoved"], true);

        let (_, page) = call(app, get_request("/api/images")).await;
        assert_eq!(page["totalPages"], 0);
        assert!(page["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_image_upload_is_rejected() {
        let app = routes().with_state(indexed_service().await);
        let boundary = "b";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nhello\r\n--{b}--\r\n",
            b = boundary
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/images")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, _) = call(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn public_mode_download_streams_payload() {
        let service = indexed_service().await;
        service.upload(image("nested/cat.png", None)).await.unwrap();
        let app = routes().with_state(service);

        let response = app
            .oneshot(get_request("/objects/nested/cat.png"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/png");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"\x89PNG");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let app = routes().with_state(indexed_service().await);
        let (status, _) = call(app, get_request("/objects/ghost.png")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
