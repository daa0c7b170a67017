use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use services::services::{
    anthropic::GenerationError, assistant::AssistantError, response_cache::CacheError,
};
use thiserror::Error;
use tracing::error;
use ts_rs::TS;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("rate limit exceeded")]
    RateLimited {
        remaining: i64,
        reset_at: DateTime<Utc>,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("generation failed: {0}")]
    Generation(GenerationError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        match err {
            AssistantError::RateLimited {
                remaining,
                reset_at,
            } => Self::RateLimited {
                remaining,
                reset_at,
            },
            AssistantError::NotFound(what) => Self::NotFound(what),
            AssistantError::Generation(e) => Self::Generation(e),
            AssistantError::Database(e) => Self::Database(e),
            AssistantError::Cache(e) => Self::Cache(e),
        }
    }
}

/// JSON error envelope shared by every endpoint. The rate-limit fields are
/// only present on 429 responses.
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

impl ErrorBody {
    fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            remaining: None,
            reset_at: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody::new("authentication required"),
            ),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, ErrorBody::new(message)),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorBody::new(format!("{what} not found")),
            ),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, ErrorBody::new(message)),
            ApiError::RateLimited {
                remaining,
                reset_at,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorBody {
                    error: "rate limit exceeded, try again later".to_string(),
                    remaining: Some(remaining),
                    reset_at: Some(reset_at),
                },
            ),
            ApiError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("internal server error"),
                )
            }
            ApiError::Generation(e) => {
                error!(error = %e, "AI generation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("generation failed"),
                )
            }
            ApiError::Cache(e) => {
                error!(error = %e, "cache error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("internal server error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
