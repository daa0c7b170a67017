//! Background maintenance for the AI bookkeeping tables: expired cache rows
//! are swept and old usage-log rows pruned on a fixed cadence.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use db::{DBService, models::ai_usage::AiUsageLog};
use thiserror::Error;
use tokio::time::interval;
use tracing::{error, info};

use super::response_cache::{CacheError, ResponseCache};

/// Usage-log rows older than this are pruned. The log only feeds the trailing
/// rate-limit window and the usage counters, so a month of history is enough.
const USAGE_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

pub struct MaintenanceService {
    db: DBService,
    cache: ResponseCache,
    poll_interval: Duration,
}

impl MaintenanceService {
    /// Spawn the background maintenance loop.
    pub async fn spawn(db: DBService) -> tokio::task::JoinHandle<()> {
        let service = Self {
            cache: ResponseCache::new(db.pool.clone()),
            db,
            poll_interval: Duration::from_secs(600),
        };
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting AI maintenance service with interval {:?}, usage retention {} days",
            self.poll_interval, USAGE_RETENTION_DAYS
        );

        let mut interval = interval(self.poll_interval);

        loop {
            interval.tick().await;
            if let Err(e) = self.run_once().await {
                error!("AI maintenance pass failed: {}", e);
            }
        }
    }

    async fn run_once(&self) -> Result<(), MaintenanceError> {
        let swept = self.cache.sweep_expired().await?;

        let cutoff = Utc::now() - ChronoDuration::days(USAGE_RETENTION_DAYS);
        let pruned = AiUsageLog::delete_older_than(&self.db.pool, cutoff).await?;

        if swept > 0 || pruned > 0 {
            info!(
                expired_cache_rows = swept,
                pruned_usage_rows = pruned,
                "AI maintenance pass complete"
            );
        }
        Ok(())
    }
}
