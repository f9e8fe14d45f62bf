//! Application error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::entry::DecodeError;
use crate::front_matter::MapError;
use crate::media::MediaError;
use crate::post::StoreError;

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("malformed body: {0}")]
    MalformedBody(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("corrupt store: {0}")]
    CorruptStore(String),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl From<DecodeError> for AppError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::MalformedBody(reason) => AppError::MalformedBody(reason),
            DecodeError::UnknownOperation(reason) => AppError::BadRequest(reason),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => AppError::NotFound,
            StoreError::InvalidId(id) => AppError::BadRequest(format!("invalid post id: {id}")),
            StoreError::Corrupt { id, reason } => AppError::CorruptStore(format!("{id}: {reason}")),
            StoreError::Io(e) => AppError::Io(e),
            StoreError::Yaml(e) => AppError::Internal(e.into()),
        }
    }
}

impl From<MediaError> for AppError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::Io(e) => AppError::Io(e),
            MediaError::Log(e) => AppError::Internal(e.into()),
        }
    }
}

impl From<MapError> for AppError {
    fn from(e: MapError) -> Self {
        match e {
            MapError::Media(e) => e.into(),
            MapError::Unnormalized => AppError::Internal(anyhow::anyhow!("entry not normalized")),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::MalformedBody(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Internal(_) | AppError::CorruptStore(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Server-side failures are logged, never echoed to the client.
        let body = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                "internal server error".to_string()
            }
            AppError::CorruptStore(reason) => {
                tracing::error!(%reason, "corrupt post document");
                "internal server error".to_string()
            }
            AppError::Io(e) => {
                tracing::error!(error = %e, "I/O error");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, body).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;
