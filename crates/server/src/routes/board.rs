//! Board and issue endpoints: the authoritative side of drag-and-drop plus
//! the snapshot the client reducer is seeded from.

use std::collections::HashMap;

use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, patch, post, put},
};
use board::{BoardIssue, BoardState};
use chrono::{DateTime, Utc};
use db::models::{
    issue::{CreateIssue, Issue, IssuePriority, UpdateIssue},
    project::Project,
    status::ProjectStatus,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use ts_rs::TS;
use uuid::Uuid;

use crate::{AppState, auth::AuthUser, error::ApiError, routes::ApiJson};

#[derive(Debug, Serialize, TS)]
pub struct BoardColumn {
    pub status: ProjectStatus,
    pub issues: Vec<Issue>,
    pub over_wip_limit: bool,
}

#[derive(Debug, Serialize, TS)]
pub struct BoardSnapshot {
    pub columns: Vec<BoardColumn>,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateIssueRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<IssuePriority>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIssueRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<IssuePriority>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct MoveIssueRequest {
    pub status_id: Uuid,
    pub position: i64,
}

/// GET /api/projects/{project_id}/board — columns in order, each with its
/// issues sorted by position and the advisory WIP flag.
pub async fn get_board(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<ResponseJson<BoardSnapshot>, ApiError> {
    let project = Project::find_by_id(&state.db.pool, project_id)
        .await?
        .ok_or(ApiError::NotFound("project"))?;

    let statuses = ProjectStatus::find_by_project(&state.db.pool, project.id).await?;
    let issues = Issue::find_by_project(&state.db.pool, project.id).await?;

    let grouping = BoardState::new(
        statuses.iter().map(|status| status.id).collect(),
        issues
            .iter()
            .map(|issue| BoardIssue {
                id: issue.id,
                status_id: issue.status_id,
                position: issue.position,
            })
            .collect(),
    );
    let by_id: HashMap<Uuid, &Issue> = issues.iter().map(|issue| (issue.id, issue)).collect();

    let columns = statuses
        .into_iter()
        .map(|status| {
            let ordered: Vec<Issue> = grouping
                .column(status.id)
                .into_iter()
                .filter_map(|entry| by_id.get(&entry.id).map(|issue| (*issue).clone()))
                .collect();
            let over_wip_limit = status
                .wip_limit
                .is_some_and(|limit| ordered.len() as i64 > limit);
            BoardColumn {
                status,
                issues: ordered,
                over_wip_limit,
            }
        })
        .collect();

    Ok(ResponseJson(BoardSnapshot { columns }))
}

/// POST /api/projects/{project_id}/issues — new issues land at the end of the
/// project's first column.
pub async fn create_issue(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
    ApiJson(payload): ApiJson<CreateIssueRequest>,
) -> Result<ResponseJson<Issue>, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }

    let project = Project::find_by_id(&state.db.pool, project_id)
        .await?
        .ok_or(ApiError::NotFound("project"))?;
    if project.is_archived() {
        return Err(ApiError::Conflict(
            "cannot create issues in an archived project".to_string(),
        ));
    }

    let statuses = ProjectStatus::find_by_project(&state.db.pool, project.id).await?;
    let default_status = statuses.first().ok_or(ApiError::NotFound("status"))?;

    let issue = Issue::create(
        &state.db.pool,
        Uuid::new_v4(),
        project.id,
        default_status.id,
        &CreateIssue {
            title: payload.title,
            description: payload.description,
            priority: payload.priority,
            assignee_id: payload.assignee_id,
            owner_id: Some(user.0),
            due_date: payload.due_date,
        },
    )
    .await?;

    Ok(ResponseJson(issue))
}

/// PATCH /api/issues/{issue_id} — partial update. The issue's cached AI
/// responses are invalidated since its content changed.
pub async fn update_issue(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(issue_id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateIssueRequest>,
) -> Result<ResponseJson<Issue>, ApiError> {
    let issue = Issue::find_by_id(&state.db.pool, issue_id)
        .await?
        .ok_or(ApiError::NotFound("issue"))?;
    let project = Project::find_by_id(&state.db.pool, issue.project_id)
        .await?
        .ok_or(ApiError::NotFound("project"))?;
    if project.is_archived() {
        return Err(ApiError::Conflict(
            "cannot update issues in an archived project".to_string(),
        ));
    }

    let updated = Issue::update(
        &state.db.pool,
        issue_id,
        &UpdateIssue {
            title: payload.title,
            description: payload.description,
            priority: payload.priority,
            assignee_id: payload.assignee_id,
            due_date: payload.due_date,
        },
    )
    .await?
    .ok_or(ApiError::NotFound("issue"))?;

    // Best-effort: stale cache entries expire on their own anyway.
    if let Err(e) = state.assistant.cache().invalidate_issue(issue_id).await {
        warn!(issue_id = %issue_id, error = %e, "failed to invalidate AI cache after issue update");
    }

    Ok(ResponseJson(updated))
}

/// PUT /api/issues/{issue_id}/move — the authoritative side of a drag. Writes
/// the moved issue's column and position as sent; concurrent moves race
/// last-write-wins and settle on the next board fetch.
pub async fn move_issue(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(issue_id): Path<Uuid>,
    ApiJson(payload): ApiJson<MoveIssueRequest>,
) -> Result<ResponseJson<Issue>, ApiError> {
    let issue = Issue::find_by_id(&state.db.pool, issue_id)
        .await?
        .ok_or(ApiError::NotFound("issue"))?;
    let project = Project::find_by_id(&state.db.pool, issue.project_id)
        .await?
        .ok_or(ApiError::NotFound("project"))?;
    if project.is_archived() {
        return Err(ApiError::Conflict(
            "cannot move issues in an archived project".to_string(),
        ));
    }

    let status = ProjectStatus::find_by_id(&state.db.pool, payload.status_id)
        .await?
        .ok_or(ApiError::NotFound("status"))?;
    if status.project_id != project.id {
        return Err(ApiError::BadRequest(
            "status belongs to a different project".to_string(),
        ));
    }

    let updated =
        Issue::update_board_position(&state.db.pool, issue_id, status.id, payload.position)
            .await?
            .ok_or(ApiError::NotFound("issue"))?;

    Ok(ResponseJson(updated))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects/{project_id}/board", get(get_board))
        .route("/projects/{project_id}/issues", post(create_issue))
        .route("/issues/{issue_id}", patch(update_issue))
        .route("/issues/{issue_id}/move", put(move_issue))
}
