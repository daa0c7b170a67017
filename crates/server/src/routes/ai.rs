//! AI feature endpoints. Each handler authenticates the caller and hands off
//! to the assistant pipeline; errors map onto the shared envelope (429 carries
//! `remaining`/`resetAt`).

use axum::{
    Router,
    extract::State,
    response::{
        IntoResponse, Json as ResponseJson, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use db::models::ai_usage::UsageStats;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use services::services::assistant::{
    CommentSummaryResponse, DuplicateQuery, DuplicateResponse, LabelSuggestionResponse,
    SuggestionResponse, SummaryOutcome,
};
use ts_rs::TS;
use uuid::Uuid;

use crate::{AppState, auth::AuthUser, error::ApiError, routes::ApiJson};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub issue_id: Uuid,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct LabelsRequest {
    pub issue_id: Uuid,
    pub project_id: Uuid,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct DuplicatesRequest {
    pub title: String,
    pub project_id: Uuid,
    pub description: Option<String>,
    pub exclude_issue_id: Option<Uuid>,
}

#[derive(Debug, Serialize, TS)]
pub struct SummaryResponse {
    pub summary: String,
    pub cached: bool,
}

/// Assistant payload plus the `cached` marker. The marker is added here, at
/// the caller; the cache itself stores the bare payload.
#[derive(Debug, Serialize)]
pub struct Tagged<T> {
    #[serde(flatten)]
    pub inner: T,
    pub cached: bool,
}

/// POST /api/ai/summary — cached summaries come back as JSON, fresh ones as
/// an SSE stream of text fragments. Mid-stream failures surface as an
/// `error` event since the status line is already on the wire.
pub async fn summarize_issue(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<IssueRequest>,
) -> Result<Response, ApiError> {
    match state
        .assistant
        .summarize_issue(user.0, payload.issue_id)
        .await?
    {
        SummaryOutcome::Cached(summary) => Ok(ResponseJson(SummaryResponse {
            summary,
            cached: true,
        })
        .into_response()),
        SummaryOutcome::Stream(fragments) => {
            let events = fragments.map(|item| match item {
                Ok(fragment) => {
                    Ok::<_, std::convert::Infallible>(Event::default().data(fragment))
                }
                Err(e) => Ok(Event::default().event("error").data(e.to_string())),
            });
            Ok(Sse::new(events)
                .keep_alive(KeepAlive::default())
                .into_response())
        }
    }
}

pub async fn suggest_actions(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<IssueRequest>,
) -> Result<ResponseJson<Tagged<SuggestionResponse>>, ApiError> {
    let (inner, cached) = state
        .assistant
        .suggest_actions(user.0, payload.issue_id)
        .await?;
    Ok(ResponseJson(Tagged { inner, cached }))
}

pub async fn suggest_labels(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<LabelsRequest>,
) -> Result<ResponseJson<Tagged<LabelSuggestionResponse>>, ApiError> {
    let (inner, cached) = state
        .assistant
        .suggest_labels(user.0, payload.issue_id, payload.project_id)
        .await?;
    Ok(ResponseJson(Tagged { inner, cached }))
}

pub async fn detect_duplicates(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<DuplicatesRequest>,
) -> Result<ResponseJson<DuplicateResponse>, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }

    let response = state
        .assistant
        .detect_duplicates(
            user.0,
            DuplicateQuery {
                title: payload.title,
                description: payload.description,
                project_id: payload.project_id,
                exclude_issue_id: payload.exclude_issue_id,
            },
        )
        .await?;
    Ok(ResponseJson(response))
}

pub async fn summarize_comments(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<IssueRequest>,
) -> Result<ResponseJson<Tagged<CommentSummaryResponse>>, ApiError> {
    let (inner, cached) = state
        .assistant
        .summarize_comments(user.0, payload.issue_id)
        .await?;
    Ok(ResponseJson(Tagged { inner, cached }))
}

pub async fn usage_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ResponseJson<UsageStats>, ApiError> {
    let stats = state.assistant.limiter().usage_stats(user.0).await?;
    Ok(ResponseJson(stats))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/ai",
        Router::new()
            .route("/summary", post(summarize_issue))
            .route("/suggestion", post(suggest_actions))
            .route("/labels", post(suggest_labels))
            .route("/duplicates", post(detect_duplicates))
            .route("/comments", post(summarize_comments))
            .route("/usage", get(usage_stats)),
    )
}
