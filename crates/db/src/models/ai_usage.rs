use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// AI feature identifier shared by the response cache and the usage log.
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display,
)]
#[sqlx(type_name = "ai_feature", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AiFeature {
    Summary,
    Suggestion,
    Labels,
    Duplicates,
    Comments,
}

/// One row per AI request. Append-only; rate limiting counts rows over a
/// trailing window and the maintenance sweep prunes old ones.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct AiUsageLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feature: AiFeature,
    pub issue_id: Option<Uuid>,
    pub tokens_used: i64,
    pub created_at: DateTime<Utc>,
}

/// Per-user usage counters for the stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub today: i64,
    pub this_week: i64,
    pub this_month: i64,
}

impl AiUsageLog {
    pub async fn create(
        pool: &SqlitePool,
        user_id: Uuid,
        feature: AiFeature,
        issue_id: Option<Uuid>,
        tokens_used: i64,
    ) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, AiUsageLog>(
            r#"INSERT INTO ai_usage_logs (id, user_id, feature, issue_id, tokens_used, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, feature, issue_id, tokens_used, created_at"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(feature)
        .bind(issue_id)
        .bind(tokens_used)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// Requests by this user for this feature at or after `since`.
    pub async fn count_since(
        pool: &SqlitePool,
        user_id: Uuid,
        feature: AiFeature,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*)
            FROM ai_usage_logs
            WHERE user_id = $1 AND feature = $2 AND created_at >= $3"#,
        )
        .bind(user_id)
        .bind(feature)
        .bind(since)
        .fetch_one(pool)
        .await
    }

    /// Requests by this user across all features at or after `since`.
    pub async fn count_for_user_since(
        pool: &SqlitePool,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*)
            FROM ai_usage_logs
            WHERE user_id = $1 AND created_at >= $2"#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(pool)
        .await
    }

    pub async fn delete_older_than(
        pool: &SqlitePool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(r#"DELETE FROM ai_usage_logs WHERE created_at < $1"#)
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::test_support;

    async fn insert_at(
        pool: &SqlitePool,
        user_id: Uuid,
        feature: AiFeature,
        created_at: DateTime<Utc>,
    ) {
        sqlx::query(
            r#"INSERT INTO ai_usage_logs (id, user_id, feature, issue_id, tokens_used, created_at)
            VALUES ($1, $2, $3, NULL, 0, $4)"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(feature)
        .bind(created_at)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn count_tracks_recorded_usage() {
        let db = test_support::db().await;
        let user = Uuid::new_v4();
        let since = Utc::now() - Duration::minutes(60);

        for _ in 0..3 {
            AiUsageLog::create(&db.pool, user, AiFeature::Summary, None, 0)
                .await
                .unwrap();
        }
        // Another feature and another user stay out of the count.
        AiUsageLog::create(&db.pool, user, AiFeature::Labels, None, 0)
            .await
            .unwrap();
        AiUsageLog::create(&db.pool, Uuid::new_v4(), AiFeature::Summary, None, 0)
            .await
            .unwrap();

        let count = AiUsageLog::count_since(&db.pool, user, AiFeature::Summary, since)
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn usage_outside_the_window_rolls_off() {
        let db = test_support::db().await;
        let user = Uuid::new_v4();
        let now = Utc::now();

        insert_at(&db.pool, user, AiFeature::Summary, now - Duration::minutes(61)).await;
        insert_at(&db.pool, user, AiFeature::Summary, now - Duration::minutes(59)).await;

        let count =
            AiUsageLog::count_since(&db.pool, user, AiFeature::Summary, now - Duration::minutes(60))
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn retention_prunes_only_old_rows() {
        let db = test_support::db().await;
        let user = Uuid::new_v4();
        let now = Utc::now();

        insert_at(&db.pool, user, AiFeature::Summary, now - Duration::days(31)).await;
        insert_at(&db.pool, user, AiFeature::Summary, now - Duration::days(1)).await;

        let pruned = AiUsageLog::delete_older_than(&db.pool, now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(pruned, 1);

        let left = AiUsageLog::count_for_user_since(&db.pool, user, now - Duration::days(365))
            .await
            .unwrap();
        assert_eq!(left, 1);
    }
}
