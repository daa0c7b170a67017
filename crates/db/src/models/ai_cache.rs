use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;

use super::ai_usage::AiFeature;

/// Cached AI response, keyed by a content hash computed by the gateway.
/// `response` holds the serialized payload verbatim; the gateway is
/// payload-agnostic and callers deserialize into their own shapes.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct AiResponseCache {
    pub cache_key: String,
    pub feature: AiFeature,
    pub response: String,
    pub expires_at: DateTime<Utc>,
}

impl AiResponseCache {
    pub async fn find(pool: &SqlitePool, cache_key: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AiResponseCache>(
            r#"SELECT cache_key, feature, response, expires_at
            FROM ai_response_cache
            WHERE cache_key = $1"#,
        )
        .bind(cache_key)
        .fetch_optional(pool)
        .await
    }

    /// Insert-or-replace; a repeated write refreshes both payload and expiry.
    pub async fn upsert(
        pool: &SqlitePool,
        cache_key: &str,
        feature: AiFeature,
        response: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO ai_response_cache (cache_key, feature, response, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(cache_key) DO UPDATE SET
                feature = excluded.feature,
                response = excluded.response,
                expires_at = excluded.expires_at"#,
        )
        .bind(cache_key)
        .bind(feature)
        .bind(response)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, cache_key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(r#"DELETE FROM ai_response_cache WHERE cache_key = $1"#)
            .bind(cache_key)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bulk removal of expired entries, for the periodic sweep.
    pub async fn delete_expired(
        pool: &SqlitePool,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(r#"DELETE FROM ai_response_cache WHERE expires_at <= $1"#)
            .bind(now)
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

    #[tokio::test]
    async fn upsert_refreshes_payload_and_expiry() {
        let db = test_support::db().await;
        let t1 = Utc::now() + Duration::minutes(5);
        let t2 = Utc::now() + Duration::minutes(30);

        AiResponseCache::upsert(&db.pool, "k", AiFeature::Labels, r#"{"v":1}"#, t1)
            .await
            .unwrap();
        AiResponseCache::upsert(&db.pool, "k", AiFeature::Labels, r#"{"v":2}"#, t2)
            .await
            .unwrap();

        let entry = AiResponseCache::find(&db.pool, "k").await.unwrap().unwrap();
        assert_eq!(entry.response, r#"{"v":2}"#);
        assert_eq!(entry.expires_at, t2);
    }

    #[tokio::test]
    async fn sweep_deletes_only_expired_entries() {
        let db = test_support::db().await;
        let now = Utc::now();

        AiResponseCache::upsert(&db.pool, "old", AiFeature::Summary, "{}", now - Duration::seconds(1))
            .await
            .unwrap();
        AiResponseCache::upsert(&db.pool, "edge", AiFeature::Summary, "{}", now)
            .await
            .unwrap();
        AiResponseCache::upsert(&db.pool, "live", AiFeature::Summary, "{}", now + Duration::minutes(10))
            .await
            .unwrap();

        // Entries expiring at or before "now" are gone.
        let swept = AiResponseCache::delete_expired(&db.pool, now).await.unwrap();
        assert_eq!(swept, 2);
        assert!(AiResponseCache::find(&db.pool, "live").await.unwrap().is_some());
    }
}
