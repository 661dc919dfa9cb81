//! crates/adaptive_tutor_core/src/memory.rs
//!
//! An in-process implementation of the persistence and document ports.
//! Used for local runs without a database and as the store behind the tests.

use crate::domain::{
    CacheEntry, ChatMessage, EnrichmentRecord, LearnerSession, Plan, Progress, SlideStatus,
    TrainingMaterial,
};
use crate::ports::{DatabaseService, DocumentStore, PortError, PortResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    materials: RwLock<HashMap<Uuid, TrainingMaterial>>,
    sessions: RwLock<HashMap<Uuid, LearnerSession>>,
    plans: RwLock<HashMap<Uuid, Plan>>,
    messages: RwLock<HashMap<Uuid, Vec<ChatMessage>>>,
    cache_entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_material(&self, material: TrainingMaterial) {
        self.materials.write().await.insert(material.id, material);
    }
}

fn session_not_found(session_id: Uuid) -> PortError {
    PortError::NotFound(format!("Learner session {} not found", session_id))
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_material(&self, training_id: Uuid) -> PortResult<TrainingMaterial> {
        self.materials
            .read()
            .await
            .get(&training_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Training {} not found", training_id)))
    }
}

#[async_trait]
impl DatabaseService for InMemoryStore {
    async fn create_learner_session(&self, session: LearnerSession) -> PortResult<LearnerSession> {
        self.sessions.write().await.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_learner_session(&self, session_id: Uuid) -> PortResult<LearnerSession> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| session_not_found(session_id))
    }

    async fn update_enriched_profile(&self, session_id: Uuid, profile: &EnrichmentRecord) -> PortResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&session_id).ok_or_else(|| session_not_found(session_id))?;
        session.enriched_profile = profile.clone();
        Ok(())
    }

    async fn update_progress(&self, session_id: Uuid, progress: &Progress) -> PortResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&session_id).ok_or_else(|| session_not_found(session_id))?;
        session.progress = progress.clone();
        Ok(())
    }

    async fn get_plan(&self, session_id: Uuid) -> PortResult<Option<Plan>> {
        Ok(self.plans.read().await.get(&session_id).cloned())
    }

    async fn save_plan(&self, plan: Plan) -> PortResult<Plan> {
        let mut plans = self.plans.write().await;
        Ok(plans.entry(plan.session_id).or_insert(plan).clone())
    }

    async fn update_slide_content(
        &self,
        session_id: Uuid,
        slide_index: usize,
        status: SlideStatus,
        content: Option<&str>,
        generated_at: Option<DateTime<Utc>>,
    ) -> PortResult<()> {
        let mut plans = self.plans.write().await;
        let slide = plans
            .get_mut(&session_id)
            .and_then(|p| p.slides.get_mut(slide_index))
            .ok_or_else(|| PortError::NotFound(format!("Slide {} of session {}", slide_index, session_id)))?;
        slide.status = status;
        slide.content = content.map(str::to_string);
        slide.generated_at = generated_at;
        Ok(())
    }

    async fn mark_slide_viewed(&self, session_id: Uuid, slide_index: usize, viewed_at: DateTime<Utc>) -> PortResult<()> {
        let mut plans = self.plans.write().await;
        let slide = plans
            .get_mut(&session_id)
            .and_then(|p| p.slides.get_mut(slide_index))
            .ok_or_else(|| PortError::NotFound(format!("Slide {} of session {}", slide_index, session_id)))?;
        slide.viewed_at.get_or_insert(viewed_at);
        Ok(())
    }

    async fn append_chat_message(&self, message: ChatMessage) -> PortResult<()> {
        self.messages
            .write()
            .await
            .entry(message.learner_session_id)
            .or_default()
            .push(message);
        Ok(())
    }

    async fn recent_chat_messages(&self, session_id: Uuid, limit: usize) -> PortResult<Vec<ChatMessage>> {
        let messages = self.messages.read().await;
        let log = messages.get(&session_id).map(Vec::as_slice).unwrap_or_default();
        let start = log.len().saturating_sub(limit);
        Ok(log[start..].to_vec())
    }

    async fn get_cache_entry(&self, material_hash: &str) -> PortResult<Option<CacheEntry>> {
        Ok(self.cache_entries.read().await.get(material_hash).cloned())
    }

    async fn upsert_cache_entry(&self, entry: &CacheEntry) -> PortResult<()> {
        self.cache_entries
            .write()
            .await
            .insert(entry.material_hash.clone(), entry.clone());
        Ok(())
    }

    async fn delete_cache_entry(&self, material_hash: &str, provider_handle: &str) -> PortResult<bool> {
        let mut entries = self.cache_entries.write().await;
        match entries.get(material_hash) {
            Some(entry) if entry.provider_handle == provider_handle => {
                entries.remove(material_hash);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
