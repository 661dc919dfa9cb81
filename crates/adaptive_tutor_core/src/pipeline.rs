//! crates/adaptive_tutor_core/src/pipeline.rs
//!
//! The entry point the presentation layer talks to. Wires the cache, rate limiter,
//! generator, conversation service and enrichment worker around shared ports.

use crate::cache::CacheManager;
use crate::config::PipelineConfig;
use crate::conversation::ConversationService;
use crate::domain::{ChatMessage, LearnerProfile, LearnerSession, Plan, Progress, RegenerationMode, Slide};
use crate::enrichment::{spawn_enrichment_worker, ProfileEnricher};
use crate::error::PipelineError;
use crate::generator::Generator;
use crate::locks::KeyedLocks;
use crate::ports::{DatabaseService, DocumentStore, GenerativeAiService};
use crate::rate_limit::RateLimiter;
use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub progress: Progress,
    pub total_slides: usize,
    pub ready_slides: usize,
}

pub struct LearningPipeline {
    db: Arc<dyn DatabaseService>,
    documents: Arc<dyn DocumentStore>,
    limiter: Arc<RateLimiter>,
    generator: Arc<Generator>,
    conversation: ConversationService,
    progress_locks: KeyedLocks<Uuid>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LearningPipeline {
    /// Builds the pipeline and starts its enrichment worker. Must run inside a tokio runtime.
    pub fn new(
        db: Arc<dyn DatabaseService>,
        documents: Arc<dyn DocumentStore>,
        ai: Arc<dyn GenerativeAiService>,
        config: PipelineConfig,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::from_config(&config));
        let cache = Arc::new(CacheManager::new(db.clone(), ai.clone(), limiter.clone(), &config));
        let generator = Arc::new(Generator::new(
            db.clone(),
            documents.clone(),
            ai.clone(),
            cache.clone(),
            limiter.clone(),
            &config,
        ));
        let enricher = Arc::new(ProfileEnricher::new(
            db.clone(),
            documents.clone(),
            ai.clone(),
            cache.clone(),
            limiter.clone(),
            &config,
        ));

        let shutdown = CancellationToken::new();
        let (queue, worker) = spawn_enrichment_worker(enricher, config.enrichment_queue_capacity, shutdown.clone());
        let conversation = ConversationService::new(
            db.clone(),
            documents.clone(),
            ai,
            cache,
            limiter.clone(),
            queue,
            &config,
        );

        info!(
            "Learning pipeline ready ({} AI calls/minute, cache TTL {}h)",
            config.rate_limit_per_minute,
            config.effective_cache_ttl_hours()
        );
        Self {
            db,
            documents,
            limiter,
            generator,
            conversation,
            progress_locks: KeyedLocks::new(),
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Creates a learner session once the intake questionnaire is complete.
    pub async fn start_session(
        &self,
        training_id: Uuid,
        profile: LearnerProfile,
    ) -> Result<LearnerSession, PipelineError> {
        self.documents.get_material(training_id).await?;
        let session = self
            .db
            .create_learner_session(LearnerSession::new(training_id, profile))
            .await?;
        info!("Learner session {} started on training {}", session.id, training_id);
        Ok(session)
    }

    pub async fn get_or_create_plan(&self, session_id: Uuid) -> Result<Plan, PipelineError> {
        self.generator.generate_plan(session_id).await
    }

    /// Shows slide `index` to the learner: returns it once `Ready`, records the view,
    /// and starts preparing the next slide in the background.
    pub async fn get_slide(&self, session_id: Uuid, index: usize) -> Result<Slide, PipelineError> {
        let plan = self.generator.generate_plan(session_id).await?;
        let slide = self.generator.generate_slide(session_id, index).await?;

        if let Err(e) = self.record_view(session_id, index).await {
            error!("Failed to record view of slide {} for session {}: {}", index, session_id, e);
        }

        if let Some(next) = plan.slide(index + 1) {
            if !next.is_ready() {
                self.generator.prefetch(session_id, next.index);
            }
        }
        Ok(slide)
    }

    pub async fn regenerate_slide(
        &self,
        session_id: Uuid,
        index: usize,
        mode: RegenerationMode,
    ) -> Result<Slide, PipelineError> {
        self.generator.regenerate_slide(session_id, index, mode).await
    }

    pub async fn ask_chat(&self, session_id: Uuid, slide_index: usize, question: &str) -> Result<String, PipelineError> {
        self.conversation.ask(session_id, slide_index, question).await
    }

    pub async fn chat_history(&self, session_id: Uuid, limit: usize) -> Result<Vec<ChatMessage>, PipelineError> {
        self.conversation.history(session_id, limit).await
    }

    pub async fn get_progress(&self, session_id: Uuid) -> Result<ProgressReport, PipelineError> {
        let session = self.db.get_learner_session(session_id).await?;
        let plan = self.db.get_plan(session_id).await?;
        Ok(ProgressReport {
            progress: session.progress,
            total_slides: plan.as_ref().map(|p| p.slides.len()).unwrap_or(0),
            ready_slides: plan.as_ref().map(Plan::ready_count).unwrap_or(0),
        })
    }

    pub async fn record_time_spent(&self, session_id: Uuid, seconds: u64) -> Result<Progress, PipelineError> {
        let _guard = self.progress_locks.lock(session_id).await;
        let mut progress = self.db.get_learner_session(session_id).await?.progress;
        progress.time_spent_secs = progress.time_spent_secs.saturating_add(seconds);
        self.db.update_progress(session_id, &progress).await?;
        Ok(progress)
    }

    /// AI calls admitted in the current rate window.
    pub fn ai_calls_in_window(&self) -> usize {
        self.limiter.in_window()
    }

    /// Stops the enrichment worker. Jobs still queued are dropped.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let worker = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Enrichment worker ended abnormally: {}", e);
            }
        }
    }

    async fn record_view(&self, session_id: Uuid, index: usize) -> Result<(), PipelineError> {
        let _guard = self.progress_locks.lock(session_id).await;
        self.db.mark_slide_viewed(session_id, index, Utc::now()).await?;
        let plan = self.generator.require_plan(session_id).await?;
        let mut progress = self.db.get_learner_session(session_id).await?.progress;
        progress.slides_viewed = plan.viewed_count();
        progress.last_slide_index = Some(index);
        self.db.update_progress(session_id, &progress).await?;
        Ok(())
    }
}
