//! Database-backed cache for AI responses, keyed by a content hash with a
//! per-feature TTL.

use chrono::{Duration, Utc};
use db::models::{ai_cache::AiResponseCache, ai_usage::AiFeature};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Cache TTL per feature, in minutes.
fn ttl_minutes(feature: AiFeature) -> i64 {
    match feature {
        AiFeature::Summary => 30,
        AiFeature::Suggestion => 15,
        AiFeature::Labels => 60,
        AiFeature::Duplicates => 10,
        AiFeature::Comments => 30,
    }
}

/// Deterministic lookup key: SHA-256 over the colon-joined feature name and
/// key parts. Order-sensitive.
pub fn cache_key(feature: AiFeature, key_parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(feature.to_string().as_bytes());
    for part in key_parts {
        hasher.update(b":");
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Clone)]
pub struct ResponseCache {
    pool: SqlitePool,
}

impl ResponseCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fresh entry or `None`. An entry found at or past its expiry is deleted
    /// on the way out (lazy expiration).
    pub async fn get<T: DeserializeOwned>(
        &self,
        feature: AiFeature,
        key_parts: &[&str],
    ) -> Result<Option<T>, CacheError> {
        let key = cache_key(feature, key_parts);
        let Some(entry) = AiResponseCache::find(&self.pool, &key).await? else {
            return Ok(None);
        };

        if entry.expires_at <= Utc::now() {
            AiResponseCache::delete(&self.pool, &key).await?;
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&entry.response)?))
    }

    /// Upsert under the feature's TTL; a repeated write for the same key
    /// refreshes payload and expiry.
    pub async fn set<T: Serialize>(
        &self,
        feature: AiFeature,
        response: &T,
        key_parts: &[&str],
    ) -> Result<(), CacheError> {
        let key = cache_key(feature, key_parts);
        let expires_at = Utc::now() + Duration::minutes(ttl_minutes(feature));
        let payload = serde_json::to_string(response)?;
        AiResponseCache::upsert(&self.pool, &key, feature, &payload, expires_at).await?;
        Ok(())
    }

    pub async fn invalidate(
        &self,
        feature: AiFeature,
        key_parts: &[&str],
    ) -> Result<(), CacheError> {
        AiResponseCache::delete(&self.pool, &cache_key(feature, key_parts)).await?;
        Ok(())
    }

    /// Drops every entry keyed by this issue alone, for mutations that change
    /// the issue's content. Duplicate detection is keyed by query text, not
    /// issue id, so it is not affected.
    pub async fn invalidate_issue(&self, issue_id: Uuid) -> Result<(), CacheError> {
        let id = issue_id.to_string();
        for feature in [
            AiFeature::Summary,
            AiFeature::Suggestion,
            AiFeature::Labels,
            AiFeature::Comments,
        ] {
            self.invalidate(feature, &[&id]).await?;
        }
        Ok(())
    }

    /// Bulk removal of expired entries; returns how many were dropped.
    pub async fn sweep_expired(&self) -> Result<u64, CacheError> {
        Ok(AiResponseCache::delete_expired(&self.pool, Utc::now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use db::DBService;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        answer: String,
        confidence: f64,
    }

    #[test]
    fn key_is_deterministic_and_order_sensitive() {
        assert_eq!(
            cache_key(AiFeature::Labels, &["a", "b"]),
            cache_key(AiFeature::Labels, &["a", "b"])
        );
        assert_ne!(
            cache_key(AiFeature::Labels, &["a", "b"]),
            cache_key(AiFeature::Labels, &["b", "a"])
        );
        assert_ne!(
            cache_key(AiFeature::Labels, &["a"]),
            cache_key(AiFeature::Summary, &["a"])
        );
        // Fixed-length hex digest.
        assert_eq!(cache_key(AiFeature::Summary, &["x"]).len(), 64);
    }

    #[tokio::test]
    async fn round_trips_the_exact_payload() {
        let db = DBService::new_in_memory().await.unwrap();
        let cache = ResponseCache::new(db.pool.clone());
        let payload = Payload {
            answer: "matches error text".to_string(),
            confidence: 0.9,
        };

        cache
            .set(AiFeature::Labels, &payload, &["issue-42"])
            .await
            .unwrap();
        let hit: Option<Payload> = cache.get(AiFeature::Labels, &["issue-42"]).await.unwrap();
        assert_eq!(hit, Some(payload));

        // A different key misses.
        let miss: Option<Payload> = cache.get(AiFeature::Labels, &["issue-43"]).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn expired_entry_returns_none_exactly_once_and_is_removed() {
        let db = DBService::new_in_memory().await.unwrap();
        let cache = ResponseCache::new(db.pool.clone());
        let key = cache_key(AiFeature::Duplicates, &["stale"]);

        // Write an already-expired entry directly at the model layer.
        db::models::ai_cache::AiResponseCache::upsert(
            &db.pool,
            &key,
            AiFeature::Duplicates,
            r#""gone""#,
            Utc::now() - Duration::seconds(1),
        )
        .await
        .unwrap();

        let hit: Option<String> = cache.get(AiFeature::Duplicates, &["stale"]).await.unwrap();
        assert!(hit.is_none());
        // The lazy delete removed the row.
        assert!(
            db::models::ai_cache::AiResponseCache::find(&db.pool, &key)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn invalidate_issue_drops_per_issue_features() {
        let db = DBService::new_in_memory().await.unwrap();
        let cache = ResponseCache::new(db.pool.clone());
        let issue_id = Uuid::new_v4();
        let id = issue_id.to_string();

        for feature in [AiFeature::Summary, AiFeature::Labels] {
            cache
                .set(feature, &"cached".to_string(), &[&id])
                .await
                .unwrap();
        }

        cache.invalidate_issue(issue_id).await.unwrap();

        let summary: Option<String> = cache.get(AiFeature::Summary, &[&id]).await.unwrap();
        let labels: Option<String> = cache.get(AiFeature::Labels, &[&id]).await.unwrap();
        assert!(summary.is_none());
        assert!(labels.is_none());
    }
}
