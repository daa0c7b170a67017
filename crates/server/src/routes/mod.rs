pub mod ai;
pub mod board;
pub mod health;

use axum::{
    Json, Router,
    extract::{FromRequest, Request, rejection::JsonRejection},
};

use crate::{AppState, error::ApiError};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(ai::router())
        .merge(board::router())
        .merge(health::router())
}

/// `axum::Json` with the rejection mapped into the shared error envelope, so
/// a missing or malformed body field comes back as a 400.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}
