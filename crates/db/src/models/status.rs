use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Ordered kanban column. `wip_limit` is advisory: the UI flags columns that
/// exceed it, nothing blocks the move.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ProjectStatus {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub color: Option<String>,
    pub position: i64,
    pub wip_limit: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ProjectStatus {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        project_id: Uuid,
        name: &str,
        position: i64,
        wip_limit: Option<i64>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ProjectStatus>(
            r#"INSERT INTO project_statuses (id, project_id, name, position, wip_limit, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, project_id, name, color, position, wip_limit, created_at"#,
        )
        .bind(id)
        .bind(project_id)
        .bind(name)
        .bind(position)
        .bind(wip_limit)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectStatus>(
            r#"SELECT id, project_id, name, color, position, wip_limit, created_at
            FROM project_statuses
            WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_project(
        pool: &SqlitePool,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectStatus>(
            r#"SELECT id, project_id, name, color, position, wip_limit, created_at
            FROM project_statuses
            WHERE project_id = $1
            ORDER BY position ASC"#,
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }
}
