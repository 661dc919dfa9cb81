//! Scripted AI backend and fixtures shared by the unit tests.

use crate::domain::{
    CacheEntry, ChatMessage, EnrichmentRecord, LearnerProfile, LearnerSession, Plan, Progress,
    SlideStatus, TrainingMaterial,
};
use crate::memory::InMemoryStore;
use crate::ports::{DatabaseService, GenerativeAiService, MaterialContext, PortError, PortResult};
use crate::schema::ResponseSchema;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

pub fn sample_material() -> TrainingMaterial {
    TrainingMaterial::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        "Workshop safety",
        "Always wear eye protection. Keep the floor clear. Report every incident.",
    )
}

pub fn beginner_profile() -> LearnerProfile {
    LearnerProfile {
        level: "beginner".into(),
        learning_style: "visual".into(),
        job: "technician".into(),
        sector: "manufacturing".into(),
        country: "FR".into(),
        language: "en".into(),
    }
}

#[derive(Default)]
pub struct FakeAi {
    pub create_calls: AtomicUsize,
    pub plan_calls: AtomicUsize,
    pub slide_calls: AtomicUsize,
    pub insight_calls: AtomicUsize,
    pub chat_calls: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_plan: AtomicBool,
    pub fail_slides: AtomicBool,
    pub malformed_slides: AtomicBool,
    pub fail_insight: AtomicBool,
    pub fail_chat: AtomicBool,
    pub slide_prompts: Mutex<Vec<String>>,
    /// Highest number of slide calls observed running at once.
    pub max_concurrent_slides: AtomicUsize,
    active_slides: AtomicUsize,
    pub chat_groundings: Mutex<Vec<String>>,
    insights: Mutex<VecDeque<Value>>,
    delay_ms: AtomicU64,
}

impl FakeAi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every backend call takes this long.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn push_insight(&self, insight: Value) {
        self.insights.lock().unwrap().push_back(insight);
    }

    async fn pause(&self) {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

/// One module, two submodules, five slides.
fn five_slide_plan() -> Value {
    json!({
        "modules": [{
            "title": "Safety basics",
            "submodules": [
                { "title": "Protection", "slides": [
                    { "title": "Why protect yourself" },
                    { "title": "Eye protection" },
                    { "title": "Hearing protection" }
                ]},
                { "title": "Incidents", "slides": [
                    { "title": "Spotting hazards" },
                    { "title": "Reporting" }
                ]}
            ]
        }]
    })
}

#[async_trait]
impl GenerativeAiService for FakeAi {
    async fn create_cached_context(&self, _material: &TrainingMaterial, _ttl: Duration) -> PortResult<String> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("cache submission rejected".into()));
        }
        Ok(format!("ctx-{}", n))
    }

    async fn generate_structured(
        &self,
        _context: &MaterialContext,
        prompt: &str,
        schema: &ResponseSchema,
    ) -> PortResult<Value> {
        match schema.name {
            "lesson_plan" => {
                self.plan_calls.fetch_add(1, Ordering::SeqCst);
                self.pause().await;
                if self.fail_plan.load(Ordering::SeqCst) {
                    return Err(PortError::Unexpected("plan call failed".into()));
                }
                Ok(five_slide_plan())
            }
            "slide_content" => {
                let n = self.slide_calls.fetch_add(1, Ordering::SeqCst) + 1;
                self.slide_prompts.lock().unwrap().push(prompt.to_string());
                let active = self.active_slides.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_concurrent_slides.fetch_max(active, Ordering::SeqCst);
                self.pause().await;
                self.active_slides.fetch_sub(1, Ordering::SeqCst);
                if self.fail_slides.load(Ordering::SeqCst) {
                    return Err(PortError::Unexpected("slide call failed".into()));
                }
                if self.malformed_slides.load(Ordering::SeqCst) {
                    return Ok(json!({ "body": "wrong field" }));
                }
                let kind = if prompt.contains("more simply") { "simplified" } else { "content" };
                Ok(json!({ "content": format!("{}-{}", kind, n) }))
            }
            "profile_insight" => {
                self.insight_calls.fetch_add(1, Ordering::SeqCst);
                self.pause().await;
                if self.fail_insight.load(Ordering::SeqCst) {
                    return Err(PortError::Unexpected("insight call failed".into()));
                }
                let next = self.insights.lock().unwrap().pop_front();
                Ok(next.unwrap_or_else(|| json!({ "interests": [], "blockers": [] })))
            }
            other => Err(PortError::Unexpected(format!("unexpected schema {}", other))),
        }
    }

    async fn chat(
        &self,
        _context: &MaterialContext,
        grounding: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> PortResult<String> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.chat_groundings.lock().unwrap().push(grounding.to_string());
        self.pause().await;
        if self.fail_chat.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("chat call failed".into()));
        }
        Ok(format!("answer to '{}' after {} turns", message, history.len()))
    }
}

/// An in-memory store whose cache deletes land only after `delete_delay`.
pub struct SlowDeleteStore {
    pub inner: InMemoryStore,
    delete_delay: Duration,
}

impl SlowDeleteStore {
    pub fn new(delete_delay: Duration) -> Self {
        Self {
            inner: InMemoryStore::new(),
            delete_delay,
        }
    }
}

#[async_trait]
impl DatabaseService for SlowDeleteStore {
    async fn create_learner_session(&self, session: LearnerSession) -> PortResult<LearnerSession> {
        self.inner.create_learner_session(session).await
    }

    async fn get_learner_session(&self, session_id: Uuid) -> PortResult<LearnerSession> {
        self.inner.get_learner_session(session_id).await
    }

    async fn update_enriched_profile(&self, session_id: Uuid, profile: &EnrichmentRecord) -> PortResult<()> {
        self.inner.update_enriched_profile(session_id, profile).await
    }

    async fn update_progress(&self, session_id: Uuid, progress: &Progress) -> PortResult<()> {
        self.inner.update_progress(session_id, progress).await
    }

    async fn get_plan(&self, session_id: Uuid) -> PortResult<Option<Plan>> {
        self.inner.get_plan(session_id).await
    }

    async fn save_plan(&self, plan: Plan) -> PortResult<Plan> {
        self.inner.save_plan(plan).await
    }

    async fn update_slide_content(
        &self,
        session_id: Uuid,
        slide_index: usize,
        status: SlideStatus,
        content: Option<&str>,
        generated_at: Option<DateTime<Utc>>,
    ) -> PortResult<()> {
        self.inner
            .update_slide_content(session_id, slide_index, status, content, generated_at)
            .await
    }

    async fn mark_slide_viewed(&self, session_id: Uuid, slide_index: usize, viewed_at: DateTime<Utc>) -> PortResult<()> {
        self.inner.mark_slide_viewed(session_id, slide_index, viewed_at).await
    }

    async fn append_chat_message(&self, message: ChatMessage) -> PortResult<()> {
        self.inner.append_chat_message(message).await
    }

    async fn recent_chat_messages(&self, session_id: Uuid, limit: usize) -> PortResult<Vec<ChatMessage>> {
        self.inner.recent_chat_messages(session_id, limit).await
    }

    async fn get_cache_entry(&self, material_hash: &str) -> PortResult<Option<CacheEntry>> {
        self.inner.get_cache_entry(material_hash).await
    }

    async fn upsert_cache_entry(&self, entry: &CacheEntry) -> PortResult<()> {
        self.inner.upsert_cache_entry(entry).await
    }

    async fn delete_cache_entry(&self, material_hash: &str, provider_handle: &str) -> PortResult<bool> {
        tokio::time::sleep(self.delete_delay).await;
        self.inner.delete_cache_entry(material_hash, provider_handle).await
    }
}
