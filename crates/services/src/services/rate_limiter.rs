//! Per-user, per-feature request throttling backed by the usage log.
//!
//! The check counts rows over a trailing window and has no side effect; a
//! slot is only consumed when usage is recorded after a successful
//! generation. Check and record are deliberately not atomic: two concurrent
//! checks can both pass, which over-admits by at most the concurrency of one
//! user's requests (best-effort throttling).

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use db::models::ai_usage::{AiFeature, AiUsageLog, UsageStats};
use serde::Serialize;
use sqlx::SqlitePool;
use ts_rs::TS;
use uuid::Uuid;

/// Request allowance per feature.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub requests: i64,
    pub window_minutes: i64,
}

fn policy(feature: AiFeature) -> RateLimitPolicy {
    let (requests, window_minutes) = match feature {
        AiFeature::Summary => (10, 60),
        AiFeature::Suggestion => (20, 60),
        AiFeature::Labels => (15, 60),
        AiFeature::Duplicates => (10, 60),
        AiFeature::Comments => (15, 60),
    };
    RateLimitPolicy {
        requests,
        window_minutes,
    }
}

/// Outcome of a rate-limit check. `reset_at` is a fixed-horizon estimate
/// (now + window), not an exact per-request expiry.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RateLimiter {
    pool: SqlitePool,
}

impl RateLimiter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn check(
        &self,
        user_id: Uuid,
        feature: AiFeature,
    ) -> Result<RateLimitDecision, sqlx::Error> {
        let policy = policy(feature);
        let now = Utc::now();
        let window_start = now - Duration::minutes(policy.window_minutes);

        let count = AiUsageLog::count_since(&self.pool, user_id, feature, window_start).await?;
        let remaining = (policy.requests - count).max(0);

        Ok(RateLimitDecision {
            allowed: remaining > 0,
            remaining,
            reset_at: now + Duration::minutes(policy.window_minutes),
        })
    }

    pub async fn record(
        &self,
        user_id: Uuid,
        feature: AiFeature,
        issue_id: Option<Uuid>,
        tokens_used: i64,
    ) -> Result<(), sqlx::Error> {
        AiUsageLog::create(&self.pool, user_id, feature, issue_id, tokens_used).await?;
        Ok(())
    }

    /// Counters for the usage endpoint: calendar day, week (from Sunday) and
    /// month, in UTC.
    pub async fn usage_stats(&self, user_id: Uuid) -> Result<UsageStats, sqlx::Error> {
        let now = Utc::now();
        let today = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let week_start =
            today - Duration::days(i64::from(now.date_naive().weekday().num_days_from_sunday()));
        let month_start = now
            .date_naive()
            .with_day(1)
            .unwrap_or(now.date_naive())
            .and_time(NaiveTime::MIN)
            .and_utc();

        Ok(UsageStats {
            today: AiUsageLog::count_for_user_since(&self.pool, user_id, today).await?,
            this_week: AiUsageLog::count_for_user_since(&self.pool, user_id, week_start).await?,
            this_month: AiUsageLog::count_for_user_since(&self.pool, user_id, month_start).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use db::DBService;

    use super::*;

    #[tokio::test]
    async fn remaining_decreases_with_recorded_usage() {
        let db = DBService::new_in_memory().await.unwrap();
        let limiter = RateLimiter::new(db.pool.clone());
        let user = Uuid::new_v4();

        let fresh = limiter.check(user, AiFeature::Summary).await.unwrap();
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 10);

        for _ in 0..4 {
            limiter
                .record(user, AiFeature::Summary, None, 0)
                .await
                .unwrap();
        }

        let after = limiter.check(user, AiFeature::Summary).await.unwrap();
        assert!(after.allowed);
        assert_eq!(after.remaining, 6);
    }

    #[tokio::test]
    async fn limit_trips_at_the_feature_allowance() {
        let db = DBService::new_in_memory().await.unwrap();
        let limiter = RateLimiter::new(db.pool.clone());
        let user = Uuid::new_v4();

        for _ in 0..10 {
            limiter
                .record(user, AiFeature::Summary, None, 0)
                .await
                .unwrap();
        }

        let decision = limiter.check(user, AiFeature::Summary).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.reset_at > Utc::now());

        // Other features keep their own allowance.
        let other = limiter.check(user, AiFeature::Labels).await.unwrap();
        assert!(other.allowed);
        assert_eq!(other.remaining, 15);
    }

    #[tokio::test]
    async fn remaining_never_goes_negative() {
        let db = DBService::new_in_memory().await.unwrap();
        let limiter = RateLimiter::new(db.pool.clone());
        let user = Uuid::new_v4();

        for _ in 0..12 {
            limiter
                .record(user, AiFeature::Duplicates, None, 0)
                .await
                .unwrap();
        }

        let decision = limiter.check(user, AiFeature::Duplicates).await.unwrap();
        assert_eq!(decision.remaining, 0);
        assert!(!decision.allowed);
    }
}
