use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{blob::BlobError, membership::KvError, store::StoreError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Upload error: {0}")]
    Blob(#[from] BlobError),

    #[error("Key-value error: {0}")]
    Kv(#[from] KvError),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message.to_string()),
            AppError::Store(_) | AppError::Blob(_) | AppError::Kv(_) | AppError::Encode(_) => {
                error!("{self}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// An [`AppError`] answered as `{"message": ...}`, the body shape the report
/// endpoint has always used.
#[derive(Debug)]
pub struct MessageError(pub AppError);

impl<E: Into<AppError>> From<E> for MessageError {
    fn from(error: E) -> Self {
        MessageError(error.into())
    }
}

impl IntoResponse for MessageError {
    fn into_response(self) -> Response {
        let (status, message) = self.0.status_and_message();

        (status, Json(json!({ "message": message }))).into_response()
    }
}
