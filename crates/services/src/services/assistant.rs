//! Feature pipelines for the AI endpoints.
//!
//! Every feature runs the same sequence: rate-limit check, cache lookup,
//! domain fetch, prompt build, generation, defensive filtering, then
//! best-effort bookkeeping (usage row + cache write). Usage is recorded after
//! a successful generation, uniformly, so failed generations never consume
//! quota. Bookkeeping failures are logged and never fail the request.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use db::models::{
    ai_usage::AiFeature,
    comment::CommentWithAuthor,
    issue::Issue,
    label::Label,
    status::ProjectStatus,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use ts_rs::TS;
use uuid::Uuid;

use super::anthropic::{self, GenerationError, GenerationRequest, TextGenerator};
use super::prompts;
use super::rate_limiter::RateLimiter;
use super::response_cache::{CacheError, ResponseCache};

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("rate limit exceeded")]
    RateLimited {
        remaining: i64,
        reset_at: DateTime<Utc>,
    },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ActionSuggestion {
    pub action: String,
    pub reason: String,
    pub priority: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionResponse {
    pub suggestions: Vec<ActionSuggestion>,
    pub blockers: Vec<String>,
    pub estimated_effort: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct SuggestedLabel {
    pub id: String,
    pub name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct LabelSuggestionResponse {
    pub suggested_labels: Vec<SuggestedLabel>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct DuplicateCandidate {
    pub id: String,
    pub title: String,
    pub similarity: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateResponse {
    pub duplicates: Vec<DuplicateCandidate>,
    pub is_likely_duplicate: bool,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CommentSummaryResponse {
    pub summary: String,
    pub key_points: Vec<String>,
    pub decisions: Vec<String>,
    pub open_questions: Vec<String>,
    pub participants: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DuplicateQuery {
    pub title: String,
    pub description: Option<String>,
    pub project_id: Uuid,
    pub exclude_issue_id: Option<Uuid>,
}

/// Result of a summary request: a cache hit carries the finished text, a miss
/// carries the live fragment stream.
pub enum SummaryOutcome {
    Cached(String),
    Stream(ReceiverStream<Result<String, GenerationError>>),
}

pub struct AiAssistant {
    pool: SqlitePool,
    cache: ResponseCache,
    limiter: RateLimiter,
    generator: Arc<dyn TextGenerator>,
}

impl AiAssistant {
    pub fn new(pool: SqlitePool, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            cache: ResponseCache::new(pool.clone()),
            limiter: RateLimiter::new(pool.clone()),
            pool,
            generator,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    async fn enforce_rate_limit(
        &self,
        user_id: Uuid,
        feature: AiFeature,
    ) -> Result<(), AssistantError> {
        let decision = self.limiter.check(user_id, feature).await?;
        if !decision.allowed {
            return Err(AssistantError::RateLimited {
                remaining: decision.remaining,
                reset_at: decision.reset_at,
            });
        }
        Ok(())
    }

    async fn issue_or_not_found(&self, issue_id: Uuid) -> Result<Issue, AssistantError> {
        Issue::find_by_id(&self.pool, issue_id)
            .await?
            .ok_or(AssistantError::NotFound("issue"))
    }

    /// Usage row plus cache write after a successful generation. Best-effort:
    /// a failure here must not fail a request the model already answered.
    async fn bookkeep<T: Serialize>(
        &self,
        user_id: Uuid,
        feature: AiFeature,
        issue_id: Option<Uuid>,
        tokens_used: i64,
        response: &T,
        key_parts: &[&str],
    ) {
        if let Err(e) = self.limiter.record(user_id, feature, issue_id, tokens_used).await {
            warn!(feature = %feature, error = %e, "failed to record AI usage");
        }
        if let Err(e) = self.cache.set(feature, response, key_parts).await {
            warn!(feature = %feature, error = %e, "failed to write AI response cache");
        }
    }

    /// Issue summary. Cache hits return the finished text; misses stream
    /// fragments as the model produces them. When the stream completes, the
    /// accumulated text is cached and usage recorded. A dropped consumer
    /// cancels the vendor call.
    pub async fn summarize_issue(
        &self,
        user_id: Uuid,
        issue_id: Uuid,
    ) -> Result<SummaryOutcome, AssistantError> {
        let feature = AiFeature::Summary;
        self.enforce_rate_limit(user_id, feature).await?;

        let key = issue_id.to_string();
        if let Some(summary) = self.cache.get::<String>(feature, &[&key]).await? {
            return Ok(SummaryOutcome::Cached(summary));
        }

        let issue = self.issue_or_not_found(issue_id).await?;
        let comments = CommentWithAuthor::find_by_issue(&self.pool, issue_id).await?;
        let prompt = prompts::issue_summary(&issue, &comments);

        let cancel = CancellationToken::new();
        let mut fragments = self
            .generator
            .stream(
                GenerationRequest::new(prompt.system, prompt.user).with_max_tokens(512),
                cancel.clone(),
            )
            .await?;

        let (tx, rx) = mpsc::channel::<Result<String, GenerationError>>(16);
        let limiter = self.limiter.clone();
        let cache = self.cache.clone();

        tokio::spawn(async move {
            let mut full_text = String::new();
            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) => {
                        full_text.push_str(&fragment);
                        if tx.send(Ok(fragment)).await.is_err() {
                            // Consumer went away; abort the vendor call and
                            // skip bookkeeping for the unfinished summary.
                            cancel.cancel();
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            if let Err(e) = limiter.record(user_id, feature, Some(issue_id), 0).await {
                warn!(error = %e, "failed to record AI usage after summary stream");
            }
            if let Err(e) = cache
                .set(feature, &full_text, &[&issue_id.to_string()])
                .await
            {
                warn!(error = %e, "failed to cache streamed summary");
            }
        });

        Ok(SummaryOutcome::Stream(ReceiverStream::new(rx)))
    }

    pub async fn suggest_actions(
        &self,
        user_id: Uuid,
        issue_id: Uuid,
    ) -> Result<(SuggestionResponse, bool), AssistantError> {
        let feature = AiFeature::Suggestion;
        self.enforce_rate_limit(user_id, feature).await?;

        let key = issue_id.to_string();
        if let Some(cached) = self.cache.get::<SuggestionResponse>(feature, &[&key]).await? {
            return Ok((cached, true));
        }

        let issue = self.issue_or_not_found(issue_id).await?;
        let status_name = ProjectStatus::find_by_id(&self.pool, issue.status_id)
            .await?
            .map(|status| status.name)
            .unwrap_or_else(|| "unknown".to_string());

        let prompt = prompts::action_suggestion(&issue, &status_name);
        let generated = self
            .generator
            .complete(GenerationRequest::new(prompt.system, prompt.user))
            .await?;
        let response: SuggestionResponse = anthropic::parse_json_response(&generated.text)?;

        self.bookkeep(
            user_id,
            feature,
            Some(issue_id),
            i64::from(generated.output_tokens),
            &response,
            &[&key],
        )
        .await;
        Ok((response, false))
    }

    pub async fn suggest_labels(
        &self,
        user_id: Uuid,
        issue_id: Uuid,
        project_id: Uuid,
    ) -> Result<(LabelSuggestionResponse, bool), AssistantError> {
        let feature = AiFeature::Labels;
        self.enforce_rate_limit(user_id, feature).await?;

        let key = issue_id.to_string();
        if let Some(cached) = self
            .cache
            .get::<LabelSuggestionResponse>(feature, &[&key])
            .await?
        {
            return Ok((cached, true));
        }

        let issue = self.issue_or_not_found(issue_id).await?;
        let labels = Label::find_by_project(&self.pool, project_id).await?;
        if labels.is_empty() {
            // Nothing to recommend from; skip the vendor call entirely so the
            // user's quota is untouched.
            return Ok((
                LabelSuggestionResponse {
                    suggested_labels: Vec::new(),
                    reasoning: "no labels available in this project".to_string(),
                },
                false,
            ));
        }

        let prompt = prompts::label_suggestion(&issue, &labels);
        let generated = self
            .generator
            .complete(GenerationRequest::new(prompt.system, prompt.user).with_max_tokens(512))
            .await?;
        let mut response: LabelSuggestionResponse =
            anthropic::parse_json_response(&generated.text)?;

        // Keep only labels that actually exist; the model occasionally
        // hallucinates ids.
        let valid_ids: HashSet<String> = labels.iter().map(|label| label.id.to_string()).collect();
        response
            .suggested_labels
            .retain(|suggested| valid_ids.contains(&suggested.id));

        self.bookkeep(
            user_id,
            feature,
            Some(issue_id),
            i64::from(generated.output_tokens),
            &response,
            &[&key],
        )
        .await;
        Ok((response, false))
    }

    /// Duplicate detection compares against the 100 most recent issues and is
    /// not cached: the query text changes as the user types.
    pub async fn detect_duplicates(
        &self,
        user_id: Uuid,
        query: DuplicateQuery,
    ) -> Result<DuplicateResponse, AssistantError> {
        let feature = AiFeature::Duplicates;
        self.enforce_rate_limit(user_id, feature).await?;

        let existing = Issue::find_recent_by_project(
            &self.pool,
            query.project_id,
            query.exclude_issue_id,
            100,
        )
        .await?;
        if existing.is_empty() {
            return Ok(DuplicateResponse {
                duplicates: Vec::new(),
                is_likely_duplicate: false,
                recommendation: "no existing issues to compare against".to_string(),
            });
        }

        let prompt =
            prompts::duplicate_detection(&query.title, query.description.as_deref(), &existing);
        let generated = self
            .generator
            .complete(GenerationRequest::new(prompt.system, prompt.user))
            .await?;
        let mut response: DuplicateResponse = anthropic::parse_json_response(&generated.text)?;

        let valid_ids: HashSet<String> = existing.iter().map(|issue| issue.id.to_string()).collect();
        response
            .duplicates
            .retain(|candidate| valid_ids.contains(&candidate.id));

        if let Err(e) = self
            .limiter
            .record(user_id, feature, None, i64::from(generated.output_tokens))
            .await
        {
            warn!(error = %e, "failed to record AI usage for duplicate detection");
        }
        Ok(response)
    }

    pub async fn summarize_comments(
        &self,
        user_id: Uuid,
        issue_id: Uuid,
    ) -> Result<(CommentSummaryResponse, bool), AssistantError> {
        let feature = AiFeature::Comments;
        self.enforce_rate_limit(user_id, feature).await?;

        let key = issue_id.to_string();
        if let Some(cached) = self
            .cache
            .get::<CommentSummaryResponse>(feature, &[&key])
            .await?
        {
            return Ok((cached, true));
        }

        self.issue_or_not_found(issue_id).await?;
        let comments = CommentWithAuthor::find_by_issue(&self.pool, issue_id).await?;
        if comments.is_empty() {
            return Ok((
                CommentSummaryResponse {
                    summary: "no comments to summarize".to_string(),
                    key_points: Vec::new(),
                    decisions: Vec::new(),
                    open_questions: Vec::new(),
                    participants: Vec::new(),
                },
                false,
            ));
        }

        let prompt = prompts::comment_summary(&comments);
        let generated = self
            .generator
            .complete(GenerationRequest::new(prompt.system, prompt.user))
            .await?;
        let response: CommentSummaryResponse = anthropic::parse_json_response(&generated.text)?;

        self.bookkeep(
            user_id,
            feature,
            Some(issue_id),
            i64::from(generated.output_tokens),
            &response,
            &[&key],
        )
        .await;
        Ok((response, false))
    }
}
