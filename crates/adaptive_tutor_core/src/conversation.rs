//! crates/adaptive_tutor_core/src/conversation.rs
//!
//! Answers learner questions grounded in the displayed slide and the enriched profile.

use crate::cache::CacheManager;
use crate::config::PipelineConfig;
use crate::domain::{ChatMessage, ChatRole};
use crate::enrichment::{ConversationExcerpt, EnrichmentJob, EnrichmentQueue};
use crate::error::PipelineError;
use crate::ports::{DatabaseService, DocumentStore, GenerativeAiService};
use crate::prompts;
use crate::rate_limit::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

pub struct ConversationService {
    db: Arc<dyn DatabaseService>,
    documents: Arc<dyn DocumentStore>,
    ai: Arc<dyn GenerativeAiService>,
    cache: Arc<CacheManager>,
    limiter: Arc<RateLimiter>,
    enrichment: EnrichmentQueue,
    history_window: usize,
    call_timeout: Duration,
}

impl ConversationService {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        documents: Arc<dyn DocumentStore>,
        ai: Arc<dyn GenerativeAiService>,
        cache: Arc<CacheManager>,
        limiter: Arc<RateLimiter>,
        enrichment: EnrichmentQueue,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            db,
            documents,
            ai,
            cache,
            limiter,
            enrichment,
            history_window: config.chat_history_window,
            call_timeout: config.ai_call_timeout,
        }
    }

    /// Answers `question` asked while slide `slide_index` is displayed.
    ///
    /// Both turns are logged only once the answer exists; a failed attempt leaves no
    /// trace in the chat log. Enrichment is queued and never delays the answer.
    pub async fn ask(
        &self,
        session_id: Uuid,
        slide_index: usize,
        question: &str,
    ) -> Result<String, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::InvalidInput("question is empty".to_string()));
        }

        let session = self.db.get_learner_session(session_id).await?;
        let plan = self.db.get_plan(session_id).await?;
        if let Some(plan) = &plan {
            if slide_index >= plan.slides.len() {
                return Err(PipelineError::SlideOutOfRange {
                    index: slide_index,
                    len: plan.slides.len(),
                });
            }
        }
        let slide = plan.as_ref().and_then(|p| p.slide(slide_index));
        let grounding = prompts::chat_grounding(&session.profile, &session.enriched_profile, slide);
        let history = self
            .db
            .recent_chat_messages(session_id, self.history_window)
            .await?;
        let material = Arc::new(self.documents.get_material(session.training_id).await?);

        let ai = &self.ai;
        let limiter = &self.limiter;
        let timeout = self.call_timeout;
        let grounding = grounding.as_str();
        let history = history.as_slice();
        let answer = self
            .cache
            .run_with_context(&material, |context| async move {
                limiter.acquire().await?;
                tokio::time::timeout(timeout, ai.chat(&context, grounding, history, question))
                    .await
                    .map_err(|_| PipelineError::ChatFailed(format!("AI call timed out after {:?}", timeout)))?
                    .map_err(PipelineError::from)
            })
            .await
            .map_err(|e| match e {
                PipelineError::RateLimitExceeded { .. } | PipelineError::ChatFailed(_) => e,
                other => PipelineError::ChatFailed(other.to_string()),
            })?;

        let answer = answer.trim().to_string();
        if answer.is_empty() {
            return Err(PipelineError::ChatFailed("backend returned an empty answer".to_string()));
        }

        self.record_exchange(session_id, slide_index, question, &answer).await;
        let queued = self.enrichment.enqueue(EnrichmentJob {
            session_id,
            excerpt: ConversationExcerpt {
                slide_index,
                question: question.to_string(),
                answer: answer.clone(),
            },
        });
        info!(
            "Answered question on slide {} for session {} (enrichment queued: {})",
            slide_index, session_id, queued
        );
        Ok(answer)
    }

    pub async fn history(&self, session_id: Uuid, limit: usize) -> Result<Vec<ChatMessage>, PipelineError> {
        self.db.get_learner_session(session_id).await?;
        Ok(self.db.recent_chat_messages(session_id, limit).await?)
    }

    async fn record_exchange(&self, session_id: Uuid, slide_index: usize, question: &str, answer: &str) {
        let turns = [
            ChatMessage::new(session_id, slide_index, ChatRole::Learner, question),
            ChatMessage::new(session_id, slide_index, ChatRole::Assistant, answer),
        ];
        for message in turns {
            if let Err(e) = self.db.append_chat_message(message).await {
                // The learner already has the answer; a lost log line must not take it away.
                error!("Failed to log chat message for session {}: {}", session_id, e);
            }
        }
    }
}
