use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "issue_priority", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum IssuePriority {
    High,
    #[default]
    Medium,
    Low,
}

/// `position` is a display ordering within a status column. Positions are not
/// required to be contiguous or unique; duplicates are transient and resolve
/// last-write-wins on the next board fetch.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Issue {
    pub id: Uuid,
    pub project_id: Uuid,
    pub status_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: IssuePriority,
    pub assignee_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateIssue {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<IssuePriority>,
    pub assignee_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateIssue {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<IssuePriority>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
}

const ISSUE_COLUMNS: &str = r#"id, project_id, status_id, title, description, priority,
    assignee_id, owner_id, due_date, position, created_at, updated_at, deleted_at"#;

impl Issue {
    /// Inserts at the end of the target column: the new position is one past
    /// the column's current maximum.
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        project_id: Uuid,
        status_id: Uuid,
        data: &CreateIssue,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Issue>(&format!(
            r#"INSERT INTO issues
                (id, project_id, status_id, title, description, priority,
                 assignee_id, owner_id, due_date, position, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                (SELECT COALESCE(MAX(position), -1) + 1 FROM issues
                 WHERE status_id = $3 AND deleted_at IS NULL),
                $10, $11)
            RETURNING {ISSUE_COLUMNS}"#
        ))
        .bind(id)
        .bind(project_id)
        .bind(status_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.priority.unwrap_or_default())
        .bind(data.assignee_id)
        .bind(data.owner_id)
        .bind(data.due_date)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Issue>(&format!(
            r#"SELECT {ISSUE_COLUMNS}
            FROM issues
            WHERE id = $1 AND deleted_at IS NULL"#
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_project(
        pool: &SqlitePool,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Issue>(&format!(
            r#"SELECT {ISSUE_COLUMNS}
            FROM issues
            WHERE project_id = $1 AND deleted_at IS NULL
            ORDER BY position ASC, created_at ASC"#
        ))
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    /// Most recently created issues of a project, newest first, optionally
    /// excluding one issue (the one being checked for duplicates).
    pub async fn find_recent_by_project(
        pool: &SqlitePool,
        project_id: Uuid,
        exclude: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        match exclude {
            Some(excluded_id) => {
                sqlx::query_as::<_, Issue>(&format!(
                    r#"SELECT {ISSUE_COLUMNS}
                    FROM issues
                    WHERE project_id = $1 AND id <> $2 AND deleted_at IS NULL
                    ORDER BY created_at DESC
                    LIMIT $3"#
                ))
                .bind(project_id)
                .bind(excluded_id)
                .bind(limit)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Issue>(&format!(
                    r#"SELECT {ISSUE_COLUMNS}
                    FROM issues
                    WHERE project_id = $1 AND deleted_at IS NULL
                    ORDER BY created_at DESC
                    LIMIT $2"#
                ))
                .bind(project_id)
                .bind(limit)
                .fetch_all(pool)
                .await
            }
        }
    }

    /// Authoritative side of a board move. Writes exactly the moved issue's
    /// column and position; other rows keep their positions (last-write-wins).
    pub async fn update_board_position(
        pool: &SqlitePool,
        id: Uuid,
        status_id: Uuid,
        position: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Issue>(&format!(
            r#"UPDATE issues
            SET status_id = $2, position = $3, updated_at = $4
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {ISSUE_COLUMNS}"#
        ))
        .bind(id)
        .bind(status_id)
        .bind(position)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateIssue,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Issue>(&format!(
            r#"UPDATE issues
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                priority = COALESCE($4, priority),
                assignee_id = COALESCE($5, assignee_id),
                due_date = COALESCE($6, due_date),
                updated_at = $7
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {ISSUE_COLUMNS}"#
        ))
        .bind(id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.priority)
        .bind(data.assignee_id)
        .bind(data.due_date)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    pub async fn soft_delete(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE issues
            SET deleted_at = $2, updated_at = $2
            WHERE id = $1 AND deleted_at IS NULL"#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support;

    #[tokio::test]
    async fn create_appends_to_end_of_column() {
        let db = test_support::db().await;
        let (project_id, status_id) = test_support::seed_board(&db.pool).await;

        let first = test_support::seed_issue(&db.pool, project_id, status_id, "first").await;
        let second = test_support::seed_issue(&db.pool, project_id, status_id, "second").await;

        assert_eq!(first.position, 0);
        assert_eq!(second.position, 1);
    }

    #[tokio::test]
    async fn board_move_rewrites_only_the_moved_issue() {
        let db = test_support::db().await;
        let (project_id, backlog) = test_support::seed_board(&db.pool).await;
        let done =
            crate::models::status::ProjectStatus::create(&db.pool, Uuid::new_v4(), project_id, "Done", 1, None)
                .await
                .unwrap();

        let a = test_support::seed_issue(&db.pool, project_id, backlog, "a").await;
        let b = test_support::seed_issue(&db.pool, project_id, backlog, "b").await;

        let moved = Issue::update_board_position(&db.pool, a.id, done.id, 0)
            .await
            .unwrap()
            .expect("issue exists");
        assert_eq!(moved.status_id, done.id);
        assert_eq!(moved.position, 0);

        let untouched = Issue::find_by_id(&db.pool, b.id).await.unwrap().unwrap();
        assert_eq!(untouched.status_id, backlog);
        assert_eq!(untouched.position, 1);
    }

    #[tokio::test]
    async fn soft_deleted_issues_are_invisible() {
        let db = test_support::db().await;
        let (project_id, status_id) = test_support::seed_board(&db.pool).await;
        let issue = test_support::seed_issue(&db.pool, project_id, status_id, "ghost").await;

        assert!(Issue::soft_delete(&db.pool, issue.id).await.unwrap());
        assert!(Issue::find_by_id(&db.pool, issue.id).await.unwrap().is_none());
        assert!(
            Issue::find_by_project(&db.pool, project_id)
                .await
                .unwrap()
                .is_empty()
        );
        // A second delete is a no-op.
        assert!(!Issue::soft_delete(&db.pool, issue.id).await.unwrap());
    }

    #[tokio::test]
    async fn recent_issues_exclude_the_issue_under_test() {
        let db = test_support::db().await;
        let (project_id, status_id) = test_support::seed_board(&db.pool).await;
        let a = test_support::seed_issue(&db.pool, project_id, status_id, "a").await;
        let b = test_support::seed_issue(&db.pool, project_id, status_id, "b").await;

        let recent = Issue::find_recent_by_project(&db.pool, project_id, Some(a.id), 100)
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, b.id);
    }
}
