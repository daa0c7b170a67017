use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
}

impl Profile {
    pub async fn create(pool: &SqlitePool, id: Uuid, name: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Profile>(
            r#"INSERT INTO profiles (id, name)
            VALUES ($1, $2)
            RETURNING id, name"#,
        )
        .bind(id)
        .bind(name)
        .fetch_one(pool)
        .await
    }
}
