use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::{analysis::AnalysisError, email::EmailError, translation::TranslationError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    /// Model call failed; `fallback` is the sentence shown in place of output.
    #[error("{message}")]
    Backend { message: String, fallback: String },
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(message) => {
                make_error_response(StatusCode::BAD_REQUEST, message, None)
            }
            AppError::Backend { message, fallback } => {
                make_error_response(StatusCode::BAD_GATEWAY, message, Some(fallback))
            }
            AppError::Internal(message) => {
                make_error_response(StatusCode::INTERNAL_SERVER_ERROR, message, None)
            }
        }
    }
}

fn make_error_response(status: StatusCode, error: String, response: Option<String>) -> Response {
    (status, Json(ErrorEnvelope { error, response })).into_response()
}

impl From<TranslationError> for AppError {
    fn from(error: TranslationError) -> Self {
        match error {
            TranslationError::Backend {
                message, fallback, ..
            } => AppError::Backend { message, fallback },
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<EmailError> for AppError {
    fn from(error: EmailError) -> Self {
        match error {
            EmailError::Backend {
                message, fallback, ..
            } => AppError::Backend { message, fallback },
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<AnalysisError> for AppError {
    fn from(error: AnalysisError) -> Self {
        match error {
            AnalysisError::Backend {
                message, fallback, ..
            } => AppError::Backend { message, fallback },
            other => AppError::BadRequest(other.to_string()),
        }
    }
}
