use crate::document_store::StoreError;
use crate::featured::FeaturedError;
use crate::media::MediaError;
use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Failure of an API request
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Featured(#[from] FeaturedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Validation(String),

    #[error("request body too large: {0}")]
    BodyTooLarge(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("admin session required")]
    Unauthorized,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Media(e) => match e {
                MediaError::InvalidMediaUrl { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_MEDIA_URL")
                }
                MediaError::UrlTooLong { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "URL_TOO_LONG"),
                MediaError::UnsupportedFileType { .. } => {
                    (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_FILE_TYPE")
                }
                MediaError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
                MediaError::MissingMediaInput { .. } | MediaError::AmbiguousMediaInput { .. } => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
                }
                MediaError::Upload(_) => (StatusCode::BAD_GATEWAY, "PERSISTENCE_FAILURE"),
            },
            ApiError::Featured(e) => match e {
                FeaturedError::CapacityExceeded { .. } => {
                    (StatusCode::CONFLICT, "CAPACITY_EXCEEDED")
                }
                FeaturedError::UnknownProduct(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                FeaturedError::Persistence(_) => (StatusCode::BAD_GATEWAY, "PERSISTENCE_FAILURE"),
            },
            ApiError::Store(StoreError::NotFound { .. }) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Store(_) => (StatusCode::BAD_GATEWAY, "PERSISTENCE_FAILURE"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::BodyTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        // Reading past the body limit surfaces as a stream error
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::BodyTooLarge(e.body_text());
        }
        ApiError::Validation(format!("malformed form data: {}", e.body_text()))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Validation(format!("expected form data: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            error!(code, error = %self, "Request failed");
        } else if status != StatusCode::UNAUTHORIZED {
            warn!(code, error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
