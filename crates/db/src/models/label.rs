use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Label {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Label {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        project_id: Uuid,
        name: &str,
        color: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Label>(
            r#"INSERT INTO labels (id, project_id, name, color, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, project_id, name, color, created_at, deleted_at"#,
        )
        .bind(id)
        .bind(project_id)
        .bind(name)
        .bind(color)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_project(
        pool: &SqlitePool,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Label>(
            r#"SELECT id, project_id, name, color, created_at, deleted_at
            FROM labels
            WHERE project_id = $1 AND deleted_at IS NULL
            ORDER BY name ASC"#,
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }
}
