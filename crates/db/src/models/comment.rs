use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Comment row joined with its author's display name, the shape prompt
/// assembly wants.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct CommentWithAuthor {
    pub id: Uuid,
    pub issue_id: Uuid,
    pub content: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

impl CommentWithAuthor {
    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        issue_id: Uuid,
        author_id: Uuid,
        content: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO comments (id, issue_id, author_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(id)
        .bind(issue_id)
        .bind(author_id)
        .bind(content)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_issue(
        pool: &SqlitePool,
        issue_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, CommentWithAuthor>(
            r#"SELECT c.id, c.issue_id, c.content, p.name AS author_name, c.created_at
            FROM comments c
            JOIN profiles p ON p.id = c.author_id
            WHERE c.issue_id = $1 AND c.deleted_at IS NULL
            ORDER BY c.created_at ASC"#,
        )
        .bind(issue_id)
        .fetch_all(pool)
        .await
    }
}
