//! crates/adaptive_tutor_core/src/enrichment.rs
//!
//! Progressive enrichment of a learner's profile from chat exchanges.
//!
//! The conversation service hands exchanges to an [`EnrichmentQueue`] and returns
//! immediately. A single worker drains the queue, so profile fusion for a session
//! is never interleaved with itself. Every failure stays inside the worker.

use crate::cache::CacheManager;
use crate::config::PipelineConfig;
use crate::domain::EnrichmentRecord;
use crate::error::PipelineError;
use crate::ports::{DatabaseService, DocumentStore, GenerativeAiService};
use crate::prompts;
use crate::rate_limit::RateLimiter;
use crate::schema::{self, ProfileInsight};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

//=========================================================================================
// Fusion
//=========================================================================================

/// Merges a freshly extracted insight into the cumulative profile.
///
/// Array fields are unioned without duplicates (case-insensitive), in first-seen order,
/// and trimmed from the oldest end once they exceed `array_cap`. Scalar fields take the
/// newest non-blank value. The history counters move forward on every call.
pub fn fuse(
    current: &EnrichmentRecord,
    insight: ProfileInsight,
    now: DateTime<Utc>,
    array_cap: usize,
) -> EnrichmentRecord {
    let mut fused = current.clone();

    merge_unique(&mut fused.interests, insight.interests, array_cap);
    merge_unique(&mut fused.blockers, insight.blockers, array_cap);

    overwrite(&mut fused.learning_style_observed, insight.learning_style_observed);
    overwrite(&mut fused.comprehension_level, insight.comprehension_level);
    overwrite(&mut fused.objectives, insight.objectives);
    overwrite(&mut fused.engagement_patterns, insight.engagement_patterns);

    let history = &mut fused.enrichment_history;
    history.total_enrichments += 1;
    history.first_enriched_at.get_or_insert(now);
    history.last_updated_at = Some(now);

    fused
}

fn merge_unique(existing: &mut Vec<String>, incoming: Vec<String>, cap: usize) {
    for item in incoming {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let seen = existing.iter().any(|e| e.to_lowercase() == item.to_lowercase());
        if !seen {
            existing.push(item.to_string());
        }
    }
    if existing.len() > cap {
        let excess = existing.len() - cap;
        existing.drain(..excess);
    }
}

fn overwrite(field: &mut Option<String>, incoming: Option<String>) {
    if let Some(value) = incoming {
        let value = value.trim();
        if !value.is_empty() {
            *field = Some(value.to_string());
        }
    }
}

//=========================================================================================
// Enricher
//=========================================================================================

/// One learner question and the tutor's answer to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationExcerpt {
    pub slide_index: usize,
    pub question: String,
    pub answer: String,
}

pub struct ProfileEnricher {
    db: Arc<dyn DatabaseService>,
    documents: Arc<dyn DocumentStore>,
    ai: Arc<dyn GenerativeAiService>,
    cache: Arc<CacheManager>,
    limiter: Arc<RateLimiter>,
    array_cap: usize,
    call_timeout: Duration,
}

impl ProfileEnricher {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        documents: Arc<dyn DocumentStore>,
        ai: Arc<dyn GenerativeAiService>,
        cache: Arc<CacheManager>,
        limiter: Arc<RateLimiter>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            db,
            documents,
            ai,
            cache,
            limiter,
            array_cap: config.enrichment_array_cap,
            call_timeout: config.ai_call_timeout,
        }
    }

    /// Extracts an insight from `excerpt` and fuses it into the session's profile.
    pub async fn enrich(
        &self,
        session_id: Uuid,
        excerpt: &ConversationExcerpt,
    ) -> Result<EnrichmentRecord, PipelineError> {
        self.try_enrich(session_id, excerpt)
            .await
            .map_err(|e| match e {
                PipelineError::EnrichmentFailed(_) => e,
                other => PipelineError::EnrichmentFailed(other.to_string()),
            })
    }

    async fn try_enrich(
        &self,
        session_id: Uuid,
        excerpt: &ConversationExcerpt,
    ) -> Result<EnrichmentRecord, PipelineError> {
        let session = self.db.get_learner_session(session_id).await?;
        let material = Arc::new(self.documents.get_material(session.training_id).await?);
        let prompt = prompts::insight_prompt(
            &session.profile,
            &session.enriched_profile,
            &excerpt.question,
            &excerpt.answer,
        );
        let schema = schema::insight_schema();

        let ai = &self.ai;
        let limiter = &self.limiter;
        let timeout = self.call_timeout;
        let prompt = prompt.as_str();
        let schema_ref = &schema;
        let value = self
            .cache
            .run_with_context(&material, |context| async move {
                limiter.acquire().await?;
                tokio::time::timeout(timeout, ai.generate_structured(&context, prompt, schema_ref))
                    .await
                    .map_err(|_| PipelineError::EnrichmentFailed(format!("AI call timed out after {:?}", timeout)))?
                    .map_err(PipelineError::from)
            })
            .await?;

        let insight: ProfileInsight = schema
            .parse(value)
            .map_err(|e| PipelineError::EnrichmentFailed(e.to_string()))?;

        let fused = fuse(&session.enriched_profile, insight, Utc::now(), self.array_cap);
        self.db.update_enriched_profile(session_id, &fused).await?;
        Ok(fused)
    }
}

//=========================================================================================
// Queue & Worker
//=========================================================================================

#[derive(Debug, Clone)]
pub struct EnrichmentJob {
    pub session_id: Uuid,
    pub excerpt: ConversationExcerpt,
}

/// The sending side of the enrichment hand-off. Never blocks the caller.
#[derive(Clone)]
pub struct EnrichmentQueue {
    tx: mpsc::Sender<EnrichmentJob>,
}

impl EnrichmentQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EnrichmentJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queues a job. Returns `false` if it was dropped because the queue is full or closed.
    pub fn enqueue(&self, job: EnrichmentJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!("Enrichment queue full, dropping job for session {}", job.session_id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!("Enrichment worker stopped, dropping job for session {}", job.session_id);
                false
            }
        }
    }
}

/// Processes jobs until the queue closes or `shutdown` fires.
pub async fn run_enrichment_worker(
    enricher: Arc<ProfileEnricher>,
    mut jobs: mpsc::Receiver<EnrichmentJob>,
    shutdown: CancellationToken,
) {
    info!("Enrichment worker started.");
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        process_job(&enricher, job).await;
    }
    info!("Enrichment worker stopped.");
}

pub fn spawn_enrichment_worker(
    enricher: Arc<ProfileEnricher>,
    capacity: usize,
    shutdown: CancellationToken,
) -> (EnrichmentQueue, JoinHandle<()>) {
    let (queue, jobs) = EnrichmentQueue::channel(capacity);
    let handle = tokio::spawn(run_enrichment_worker(enricher, jobs, shutdown));
    (queue, handle)
}

async fn process_job(enricher: &Arc<ProfileEnricher>, job: EnrichmentJob) {
    let session_id = job.session_id;
    let enricher = enricher.clone();
    // Runs in its own task so a panic is contained like any other failure.
    let outcome = tokio::spawn(async move { enricher.enrich(job.session_id, &job.excerpt).await }).await;
    match outcome {
        Ok(Ok(record)) => info!(
            "Enriched profile of session {} ({} enrichments)",
            session_id, record.enrichment_history.total_enrichments
        ),
        Ok(Err(e)) => error!("Enrichment of session {} failed: {}", session_id, e),
        Err(e) => error!("Enrichment task for session {} aborted: {}", session_id, e),
    }
}
