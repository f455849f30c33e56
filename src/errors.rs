use crate::services::error::GalleryError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<GalleryError> for AppError {
    fn from(err: GalleryError) -> Self {
        let status = match &err {
            err if err.is_transport() => StatusCode::BAD_GATEWAY,
            GalleryError::InvalidPageRequest(_)
            | GalleryError::InvalidObjectKey(_)
            | GalleryError::UnsupportedContentType(_)
            | GalleryError::InvalidContinuationToken => StatusCode::BAD_REQUEST,
            GalleryError::DuplicateKey(_) => StatusCode::CONFLICT,
            GalleryError::ObjectNotFound(_) => StatusCode::NOT_FOUND,
            GalleryError::InvalidSignature | GalleryError::SignatureExpired => {
                StatusCode::FORBIDDEN
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_kinds_to_statuses() {
        let cases = [
            (
                GalleryError::InvalidPageRequest("size".into()),
                StatusCode::BAD_REQUEST,
            ),
            (GalleryError::DuplicateKey("a".into()), StatusCode::CONFLICT),
            (GalleryError::ObjectNotFound("a".into()), StatusCode::NOT_FOUND),
            (GalleryError::SignatureExpired, StatusCode::FORBIDDEN),
            (
                GalleryError::ListingFailed("down".into()),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status, expected);
        }
    }
}
