//! End-to-end tests for the board endpoints: snapshot grouping, the
//! authoritative move, and the archived-project guard.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use db::{
    DBService,
    models::{
        issue::{CreateIssue, Issue},
        project::Project,
        status::ProjectStatus,
    },
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use server::AppState;
use services::services::anthropic::{
    Generated, GenerationError, GenerationRequest, TextGenerator, TextStream,
};
use services::services::assistant::AiAssistant;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

/// The board endpoints never generate text; this generator fails loudly if
/// anything tries.
struct NoGenerator;

#[async_trait]
impl TextGenerator for NoGenerator {
    async fn complete(&self, _request: GenerationRequest) -> Result<Generated, GenerationError> {
        Err(GenerationError::Transport("unexpected vendor call".to_string()))
    }

    async fn stream(
        &self,
        _request: GenerationRequest,
        _cancel: CancellationToken,
    ) -> Result<TextStream, GenerationError> {
        Err(GenerationError::Transport("unexpected vendor call".to_string()))
    }
}

struct TestBoard {
    app: Router,
    db: DBService,
    project_id: Uuid,
    backlog_id: Uuid,
    done_id: Uuid,
}

async fn seed_board() -> TestBoard {
    let db = DBService::new_in_memory().await.expect("database");
    let project = Project::create(&db.pool, Uuid::new_v4(), "apollo")
        .await
        .expect("project");
    let backlog = ProjectStatus::create(&db.pool, Uuid::new_v4(), project.id, "Backlog", 0, None)
        .await
        .expect("backlog");
    let done =
        ProjectStatus::create(&db.pool, Uuid::new_v4(), project.id, "Done", 1, Some(2))
            .await
            .expect("done");

    let assistant = Arc::new(AiAssistant::new(db.pool.clone(), Arc::new(NoGenerator)));
    let app = server::router(AppState {
        db: db.clone(),
        assistant,
    });

    TestBoard {
        app,
        db,
        project_id: project.id,
        backlog_id: backlog.id,
        done_id: done.id,
    }
}

async fn seed_issue(board: &TestBoard, title: &str) -> Issue {
    Issue::create(
        &board.db.pool,
        Uuid::new_v4(),
        board.project_id,
        board.backlog_id,
        &CreateIssue {
            title: title.to_string(),
            description: None,
            priority: None,
            assignee_id: None,
            owner_id: None,
            due_date: None,
        },
    )
    .await
    .expect("issue")
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", Uuid::new_v4().to_string())
        .header("content-type", "application/json");
    match body {
        Some(value) => builder.body(Body::from(value.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn snapshot_groups_issues_by_column_in_position_order() {
    let board = seed_board().await;
    let first = seed_issue(&board, "first").await;
    let second = seed_issue(&board, "second").await;

    let response = board
        .app
        .oneshot(request(
            "GET",
            &format!("/api/projects/{}/board", board.project_id),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let columns = body["columns"].as_array().unwrap();
    assert_eq!(columns.len(), 2);

    let backlog = &columns[0];
    assert_eq!(backlog["status"]["name"], "Backlog");
    let ids: Vec<&str> = backlog["issues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|issue| issue["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![first.id.to_string(), second.id.to_string()]);
    assert_eq!(columns[1]["issues"].as_array().unwrap().len(), 0);
    assert_eq!(columns[1]["over_wip_limit"], false);
}

#[tokio::test]
async fn move_writes_the_sent_column_and_position() {
    let board = seed_board().await;
    let issue = seed_issue(&board, "movable").await;

    let response = board
        .app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/api/issues/{}/move", issue.id),
            Some(json!({ "statusId": board.done_id, "position": 0 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status_id"], board.done_id.to_string());
    assert_eq!(body["position"], 0);
}

#[tokio::test]
async fn move_rejects_a_status_from_another_project() {
    let board = seed_board().await;
    let issue = seed_issue(&board, "stuck").await;

    let other_project = Project::create(&board.db.pool, Uuid::new_v4(), "zeus")
        .await
        .unwrap();
    let foreign_status = ProjectStatus::create(
        &board.db.pool,
        Uuid::new_v4(),
        other_project.id,
        "Elsewhere",
        0,
        None,
    )
    .await
    .unwrap();

    let response = board
        .app
        .oneshot(request(
            "PUT",
            &format!("/api/issues/{}/move", issue.id),
            Some(json!({ "statusId": foreign_status.id, "position": 0 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn archived_projects_refuse_moves_and_creates() {
    let board = seed_board().await;
    let issue = seed_issue(&board, "frozen").await;
    Project::set_archived(&board.db.pool, board.project_id, true)
        .await
        .unwrap();

    let response = board
        .app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/api/issues/{}/move", issue.id),
            Some(json!({ "statusId": board.done_id, "position": 0 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = board
        .app
        .oneshot(request(
            "POST",
            &format!("/api/projects/{}/issues", board.project_id),
            Some(json!({ "title": "too late" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn created_issues_append_to_the_first_column() {
    let board = seed_board().await;
    seed_issue(&board, "existing").await;

    let response = board
        .app
        .oneshot(request(
            "POST",
            &format!("/api/projects/{}/issues", board.project_id),
            Some(json!({ "title": "newcomer", "priority": "HIGH" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status_id"], board.backlog_id.to_string());
    assert_eq!(body["position"], 1);
    assert_eq!(body["priority"], "HIGH");
}
