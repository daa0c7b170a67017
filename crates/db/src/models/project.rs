use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub async fn create(pool: &SqlitePool, id: Uuid, name: &str) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Project>(
            r#"INSERT INTO projects (id, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, archived_at, created_at, updated_at, deleted_at"#,
        )
        .bind(id)
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"SELECT id, name, archived_at, created_at, updated_at, deleted_at
            FROM projects
            WHERE id = $1 AND deleted_at IS NULL"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn set_archived(
        pool: &SqlitePool,
        id: Uuid,
        archived: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let now = Utc::now();
        let archived_at = archived.then_some(now);
        sqlx::query_as::<_, Project>(
            r#"UPDATE projects
            SET archived_at = $2, updated_at = $3
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, name, archived_at, created_at, updated_at, deleted_at"#,
        )
        .bind(id)
        .bind(archived_at)
        .bind(now)
        .fetch_optional(pool)
        .await
    }
}
