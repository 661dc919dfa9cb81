//! crates/adaptive_tutor_core/src/generator.rs
//!
//! Builds a learner's plan once, then fills slide content in lazily.
//!
//! Slide generation is single-flight per `(session, slide)`: the first caller spawns
//! a generation task and registers a watch channel; later callers for the same slide
//! subscribe to it instead of calling the backend again. The spawned task runs to
//! completion even if every waiter goes away. Within one session a lane lock keeps at
//! most one slide in `Generating` at any time.

use crate::cache::CacheManager;
use crate::config::PipelineConfig;
use crate::domain::{Plan, PlanModule, PlanSubmodule, RegenerationMode, Slide, SlideStatus, TrainingMaterial};
use crate::error::PipelineError;
use crate::locks::KeyedLocks;
use crate::ports::{DatabaseService, DocumentStore, GenerativeAiService, PortError};
use crate::prompts;
use crate::rate_limit::RateLimiter;
use crate::schema::{self, PlanOutline, ResponseSchema, SlideBody};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub type SlideOutcome = Result<Slide, PipelineError>;

type InFlight = HashMap<(Uuid, usize), watch::Receiver<Option<SlideOutcome>>>;

pub struct Generator {
    db: Arc<dyn DatabaseService>,
    documents: Arc<dyn DocumentStore>,
    ai: Arc<dyn GenerativeAiService>,
    cache: Arc<CacheManager>,
    limiter: Arc<RateLimiter>,
    call_timeout: Duration,
    plan_locks: KeyedLocks<Uuid>,
    lanes: KeyedLocks<Uuid>,
    in_flight: Mutex<InFlight>,
}

impl Generator {
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
            call_timeout: config.ai_call_timeout,
            plan_locks: KeyedLocks::new(),
            lanes: KeyedLocks::new(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    //=====================================================================================
    // Plan
    //=====================================================================================

    /// Returns the session's plan, generating the skeleton on the first call.
    pub async fn generate_plan(&self, session_id: Uuid) -> Result<Plan, PipelineError> {
        if let Some(plan) = self.db.get_plan(session_id).await? {
            return Ok(plan);
        }

        let _creating = self.plan_locks.lock(session_id).await;
        if let Some(plan) = self.db.get_plan(session_id).await? {
            return Ok(plan);
        }

        let session = self.db.get_learner_session(session_id).await?;
        let material = Arc::new(self.documents.get_material(session.training_id).await?);
        let prompt = prompts::plan_prompt(&session.profile);
        let schema = schema::plan_schema();

        let value = self.structured_call(&material, &prompt, &schema).await?;
        let outline: PlanOutline = schema
            .parse(value)
            .map_err(|e| PipelineError::GenerationFailed(e.to_string()))?;
        let plan = build_plan(session_id, outline)?;

        let plan = self.db.save_plan(plan).await?;
        info!(
            "Plan ready for session {}: {} modules, {} slides",
            session_id,
            plan.modules.len(),
            plan.slides.len()
        );
        Ok(plan)
    }

    pub async fn require_plan(&self, session_id: Uuid) -> Result<Plan, PipelineError> {
        self.db
            .get_plan(session_id)
            .await?
            .ok_or(PipelineError::PlanNotReady(session_id))
    }

    //=====================================================================================
    // Slides
    //=====================================================================================

    /// Returns slide `index` once it is `Ready`, generating it if needed.
    pub async fn generate_slide(self: &Arc<Self>, session_id: Uuid, index: usize) -> SlideOutcome {
        let plan = self.require_plan(session_id).await?;
        let slide = slide_at(&plan, index)?;
        if slide.is_ready() {
            return Ok(slide.clone());
        }
        self.single_flight(session_id, index, None).await
    }

    /// Rewrites the content of a slide. The plan structure is untouched.
    pub async fn regenerate_slide(
        self: &Arc<Self>,
        session_id: Uuid,
        index: usize,
        mode: RegenerationMode,
    ) -> SlideOutcome {
        let plan = self.require_plan(session_id).await?;
        slide_at(&plan, index)?;
        self.single_flight(session_id, index, Some(mode)).await
    }

    /// Starts generating slide `index` in the background. Failures are only logged and
    /// leave the slide `Pending` for a later on-demand attempt.
    pub fn prefetch(self: &Arc<Self>, session_id: Uuid, index: usize) -> JoinHandle<()> {
        let generator = self.clone();
        tokio::spawn(async move {
            match generator.generate_slide(session_id, index).await {
                Ok(_) => debug!("Look-ahead slide {} ready for session {}", index, session_id),
                Err(PipelineError::SlideOutOfRange { .. }) => {}
                Err(e) => warn!(
                    "Look-ahead generation of slide {} for session {} failed: {}",
                    index, session_id, e
                ),
            }
        })
    }

    /// Number of slide generations currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    async fn single_flight(
        self: &Arc<Self>,
        session_id: Uuid,
        index: usize,
        mode: Option<RegenerationMode>,
    ) -> SlideOutcome {
        let key = (session_id, index);
        let mut rx = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
            // A closed channel means the task died without reporting; take over.
            let running = in_flight
                .get(&key)
                .filter(|rx| rx.has_changed().is_ok())
                .cloned();
            match running {
                Some(rx) => {
                    debug!("Joining in-flight generation of slide {} for session {}", index, session_id);
                    rx
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key, rx.clone());
                    let generator = self.clone();
                    tokio::spawn(async move {
                        let outcome = generator.run_generation(session_id, index, mode).await;
                        generator.finish(key, tx, outcome);
                    });
                    rx
                }
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(PipelineError::GenerationFailed(
                "generation task ended without a result".to_string(),
            ))
        })
    }

    fn finish(&self, key: (Uuid, usize), tx: watch::Sender<Option<SlideOutcome>>, outcome: SlideOutcome) {
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&key);
        tx.send_replace(Some(outcome));
    }

    async fn run_generation(
        &self,
        session_id: Uuid,
        index: usize,
        mode: Option<RegenerationMode>,
    ) -> SlideOutcome {
        let _lane = self.lanes.lock(session_id).await;

        let plan = self.require_plan(session_id).await?;
        let mut slide = slide_at(&plan, index)?.clone();
        // Only a slide that already has content can be simplified or deepened.
        let mode = mode.filter(|_| slide.is_ready());
        if mode.is_none() && slide.is_ready() {
            return Ok(slide);
        }

        self.db
            .update_slide_content(
                session_id,
                index,
                SlideStatus::Generating,
                slide.content.as_deref(),
                slide.generated_at,
            )
            .await?;
        debug!("Generating slide {} for session {} ({:?})", index, session_id, mode);

        match self.produce_slide(&plan, &slide, mode).await {
            Ok(content) => {
                let now = Utc::now();
                self.db
                    .update_slide_content(session_id, index, SlideStatus::Ready, Some(&content), Some(now))
                    .await?;
                slide.status = SlideStatus::Ready;
                slide.content = Some(content);
                slide.generated_at = Some(now);
                info!("Slide {} ready for session {}", index, session_id);
                Ok(slide)
            }
            Err(e) => {
                // A failed rewrite keeps the previous content; a failed first generation goes back to Pending.
                let revert = match mode {
                    Some(_) => SlideStatus::Ready,
                    None => SlideStatus::Pending,
                };
                if let Err(revert_err) = self
                    .db
                    .update_slide_content(session_id, index, revert, slide.content.as_deref(), slide.generated_at)
                    .await
                {
                    error!(
                        "Failed to revert slide {} of session {} after a generation error: {}",
                        index, session_id, revert_err
                    );
                }
                warn!("Generation of slide {} for session {} failed: {}", index, session_id, e);
                Err(e)
            }
        }
    }

    async fn produce_slide(
        &self,
        plan: &Plan,
        slide: &Slide,
        mode: Option<RegenerationMode>,
    ) -> Result<String, PipelineError> {
        let session = self.db.get_learner_session(plan.session_id).await?;
        let material = Arc::new(self.documents.get_material(session.training_id).await?);
        let prompt = prompts::slide_prompt(plan, slide, &session.profile, &session.enriched_profile, mode);
        let schema = schema::slide_schema();

        let value = self.structured_call(&material, &prompt, &schema).await?;
        let body: SlideBody = schema
            .parse(value)
            .map_err(|e| PipelineError::GenerationFailed(e.to_string()))?;
        Ok(body.content.trim().to_string())
    }

    /// One rate-limited, time-boxed structured call against the material's context.
    async fn structured_call(
        &self,
        material: &Arc<TrainingMaterial>,
        prompt: &str,
        schema: &ResponseSchema,
    ) -> Result<serde_json::Value, PipelineError> {
        let ai = &self.ai;
        let limiter = &self.limiter;
        let timeout = self.call_timeout;

        self.cache
            .run_with_context(material, |context| async move {
                limiter.acquire().await?;
                match tokio::time::timeout(timeout, ai.generate_structured(&context, prompt, schema)).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(PortError::ContextExpired(handle))) => {
                        Err(PipelineError::Port(PortError::ContextExpired(handle)))
                    }
                    Ok(Err(e)) => Err(PipelineError::GenerationFailed(e.to_string())),
                    Err(_) => Err(PipelineError::GenerationFailed(format!(
                        "AI call timed out after {:?}",
                        timeout
                    ))),
                }
            })
            .await
            .map_err(|e| match e {
                PipelineError::Port(port) => PipelineError::GenerationFailed(port.to_string()),
                other => other,
            })
    }
}

fn slide_at(plan: &Plan, index: usize) -> Result<&Slide, PipelineError> {
    plan.slide(index).ok_or(PipelineError::SlideOutOfRange {
        index,
        len: plan.slides.len(),
    })
}

/// Flattens a validated outline into a plan whose slides are all `Pending`.
fn build_plan(session_id: Uuid, outline: PlanOutline) -> Result<Plan, PipelineError> {
    let mut modules = Vec::with_capacity(outline.modules.len());
    let mut slides = Vec::new();

    for (module_index, module) in outline.modules.into_iter().enumerate() {
        let mut submodules = Vec::with_capacity(module.submodules.len());
        for (submodule_index, submodule) in module.submodules.into_iter().enumerate() {
            for slide in submodule.slides {
                slides.push(Slide::pending(
                    slides.len(),
                    module_index,
                    submodule_index,
                    slide.title.trim().to_string(),
                ));
            }
            submodules.push(PlanSubmodule {
                title: submodule.title.trim().to_string(),
            });
        }
        modules.push(PlanModule {
            title: module.title.trim().to_string(),
            submodules,
        });
    }

    if slides.is_empty() {
        return Err(PipelineError::GenerationFailed("plan contains no slides".to_string()));
    }

    Ok(Plan {
        session_id,
        modules,
        slides,
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LearnerSession;
    use crate::memory::InMemoryStore;
    use crate::test_support::{beginner_profile, sample_material, FakeAi};
    use std::sync::atomic::Ordering;

    struct Harness {
        store: Arc<InMemoryStore>,
        ai: Arc<FakeAi>,
        generator: Arc<Generator>,
        session_id: Uuid,
    }

    async fn harness_with(ai: FakeAi, config: PipelineConfig) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let ai = Arc::new(ai);
        let material = sample_material();
        let training_id = material.id;
        store.insert_material(material).await;
        let session = store
            .create_learner_session(LearnerSession::new(training_id, beginner_profile()))
            .await
            .unwrap();

        let limiter = Arc::new(RateLimiter::from_config(&config));
        let cache = Arc::new(CacheManager::new(store.clone(), ai.clone(), limiter.clone(), &config));
        let generator = Arc::new(Generator::new(
            store.clone(),
            store.clone(),
            ai.clone(),
            cache,
            limiter,
            &config,
        ));
        Harness {
            store,
            ai,
            generator,
            session_id: session.id,
        }
    }

    async fn harness(ai: FakeAi) -> Harness {
        harness_with(ai, PipelineConfig::default()).await
    }

    async fn stored_slide(h: &Harness, index: usize) -> Slide {
        h.store.get_plan(h.session_id).await.unwrap().unwrap().slides[index].clone()
    }

    #[tokio::test]
    async fn plan_is_generated_once_with_pending_slides() {
        let h = harness(FakeAi::new()).await;

        let first = h.generator.generate_plan(h.session_id).await.unwrap();
        let second = h.generator.generate_plan(h.session_id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.ai.plan_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.slides.len(), 5);
        assert_eq!(first.modules[0].submodules.len(), 2);
        assert!(first.slides.iter().all(|s| s.status == SlideStatus::Pending));
        assert_eq!(first.slides[3].submodule_index, 1);
        assert_eq!(first.slides[4].index, 4);
    }

    #[tokio::test]
    async fn concurrent_plan_requests_call_the_backend_once() {
        let h = harness(FakeAi::new().with_delay(Duration::from_millis(30))).await;

        let (a, b) = tokio::join!(
            h.generator.generate_plan(h.session_id),
            h.generator.generate_plan(h.session_id)
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(h.ai.plan_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_plan_is_not_stored() {
        let h = harness(FakeAi::new()).await;
        h.ai.fail_plan.store(true, Ordering::SeqCst);

        let err = h.generator.generate_plan(h.session_id).await.unwrap_err();
        assert!(matches!(err, PipelineError::GenerationFailed(_)));
        assert!(h.store.get_plan(h.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn slide_requires_a_plan_and_a_valid_index() {
        let h = harness(FakeAi::new()).await;
        let err = h.generator.generate_slide(h.session_id, 0).await.unwrap_err();
        assert!(matches!(err, PipelineError::PlanNotReady(_)));

        h.generator.generate_plan(h.session_id).await.unwrap();
        let err = h.generator.generate_slide(h.session_id, 9).await.unwrap_err();
        assert!(matches!(err, PipelineError::SlideOutOfRange { index: 9, len: 5 }));
    }

    #[tokio::test]
    async fn ready_slide_is_memoized() {
        let h = harness(FakeAi::new()).await;
        h.generator.generate_plan(h.session_id).await.unwrap();

        let first = h.generator.generate_slide(h.session_id, 0).await.unwrap();
        let second = h.generator.generate_slide(h.session_id, 0).await.unwrap();

        assert_eq!(first.status, SlideStatus::Ready);
        assert_eq!(first.content, second.content);
        assert_eq!(h.ai.slide_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn racing_requests_share_one_generation() {
        let h = harness(FakeAi::new().with_delay(Duration::from_millis(50))).await;
        h.generator.generate_plan(h.session_id).await.unwrap();

        let (a, b) = tokio::join!(
            h.generator.generate_slide(h.session_id, 2),
            h.generator.generate_slide(h.session_id, 2)
        );

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert_eq!(h.ai.slide_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.generator.in_flight(), 0);
    }

    #[tokio::test]
    async fn one_slide_generates_at_a_time_per_session() {
        let h = harness(FakeAi::new().with_delay(Duration::from_millis(20))).await;
        h.generator.generate_plan(h.session_id).await.unwrap();

        let (a, b, c) = tokio::join!(
            h.generator.generate_slide(h.session_id, 0),
            h.generator.generate_slide(h.session_id, 1),
            h.generator.generate_slide(h.session_id, 2)
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(h.ai.max_concurrent_slides.load(Ordering::SeqCst), 1);
        assert_eq!(h.ai.slide_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failure_reverts_to_pending_and_retry_succeeds() {
        let h = harness(FakeAi::new()).await;
        h.generator.generate_plan(h.session_id).await.unwrap();
        h.ai.fail_slides.store(true, Ordering::SeqCst);

        let err = h.generator.generate_slide(h.session_id, 0).await.unwrap_err();
        assert!(matches!(err, PipelineError::GenerationFailed(_)));
        assert_eq!(stored_slide(&h, 0).await.status, SlideStatus::Pending);

        h.ai.fail_slides.store(false, Ordering::SeqCst);
        let slide = h.generator.generate_slide(h.session_id, 0).await.unwrap();
        assert_eq!(slide.status, SlideStatus::Ready);
        assert_eq!(h.ai.slide_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_response_is_a_generation_failure() {
        let h = harness(FakeAi::new()).await;
        h.generator.generate_plan(h.session_id).await.unwrap();
        h.ai.malformed_slides.store(true, Ordering::SeqCst);

        let err = h.generator.generate_slide(h.session_id, 1).await.unwrap_err();
        match err {
            PipelineError::GenerationFailed(reason) => assert!(reason.contains("$.content")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stored_slide(&h, 1).await.status, SlideStatus::Pending);
    }

    #[tokio::test]
    async fn slow_backend_times_out_as_generation_failure() {
        let config = PipelineConfig {
            ai_call_timeout: Duration::from_millis(20),
            ..PipelineConfig::default()
        };
        let h = harness_with(FakeAi::new(), config).await;
        h.generator.generate_plan(h.session_id).await.unwrap();
        h.ai.set_delay(Duration::from_millis(200));

        let err = h.generator.generate_slide(h.session_id, 0).await.unwrap_err();
        match err {
            PipelineError::GenerationFailed(reason) => assert!(reason.contains("timed out")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stored_slide(&h, 0).await.status, SlideStatus::Pending);
    }

    #[tokio::test]
    async fn exhausted_rate_budget_is_surfaced_and_slide_stays_pending() {
        // Three admissions: cache submission, plan, slide 0.
        let config = PipelineConfig {
            rate_limit_per_minute: 3,
            rate_limit_max_wait: Duration::ZERO,
            ..PipelineConfig::default()
        };
        let h = harness_with(FakeAi::new(), config).await;
        h.generator.generate_plan(h.session_id).await.unwrap();
        h.generator.generate_slide(h.session_id, 0).await.unwrap();

        let err = h.generator.generate_slide(h.session_id, 1).await.unwrap_err();
        assert!(matches!(err, PipelineError::RateLimitExceeded { .. }));
        assert!(err.is_retryable());
        assert_eq!(stored_slide(&h, 1).await.status, SlideStatus::Pending);
        assert_eq!(h.ai.slide_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_generating_status_is_recovered() {
        let h = harness(FakeAi::new()).await;
        h.generator.generate_plan(h.session_id).await.unwrap();
        h.store
            .update_slide_content(h.session_id, 0, SlideStatus::Generating, None, None)
            .await
            .unwrap();

        let slide = h.generator.generate_slide(h.session_id, 0).await.unwrap();
        assert_eq!(slide.status, SlideStatus::Ready);
    }

    #[tokio::test]
    async fn regeneration_rewrites_content_only() {
        let h = harness(FakeAi::new()).await;
        let plan = h.generator.generate_plan(h.session_id).await.unwrap();
        let original = h.generator.generate_slide(h.session_id, 0).await.unwrap();

        let simplified = h
            .generator
            .regenerate_slide(h.session_id, 0, RegenerationMode::Simplify)
            .await
            .unwrap();

        assert_ne!(simplified.content, original.content);
        assert!(simplified.content.unwrap().starts_with("simplified"));
        assert_eq!(simplified.title, original.title);
        let prompts = h.ai.slide_prompts.lock().unwrap().clone();
        assert!(prompts[1].contains(original.content.as_deref().unwrap()));

        let after = h.generator.require_plan(h.session_id).await.unwrap();
        assert_eq!(after.modules, plan.modules);
        assert_eq!(after.slides.len(), plan.slides.len());
    }

    #[tokio::test]
    async fn failed_regeneration_keeps_previous_content() {
        let h = harness(FakeAi::new()).await;
        h.generator.generate_plan(h.session_id).await.unwrap();
        let original = h.generator.generate_slide(h.session_id, 0).await.unwrap();
        h.ai.fail_slides.store(true, Ordering::SeqCst);

        h.generator
            .regenerate_slide(h.session_id, 0, RegenerationMode::Deepen)
            .await
            .unwrap_err();

        let stored = stored_slide(&h, 0).await;
        assert_eq!(stored.status, SlideStatus::Ready);
        assert_eq!(stored.content, original.content);
    }

    #[tokio::test]
    async fn prefetch_prepares_the_next_slide() {
        let h = harness(FakeAi::new()).await;
        h.generator.generate_plan(h.session_id).await.unwrap();

        h.generator.prefetch(h.session_id, 1).await.unwrap();
        assert!(stored_slide(&h, 1).await.is_ready());

        // Past the end of the plan nothing happens.
        h.generator.prefetch(h.session_id, 5).await.unwrap();
        assert_eq!(h.ai.slide_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generation_shares_the_material_cache() {
        let h = harness(FakeAi::new()).await;
        h.generator.generate_plan(h.session_id).await.unwrap();
        h.generator.generate_slide(h.session_id, 0).await.unwrap();
        h.generator.generate_slide(h.session_id, 1).await.unwrap();
        assert_eq!(h.ai.create_calls.load(Ordering::SeqCst), 1);
    }
}
