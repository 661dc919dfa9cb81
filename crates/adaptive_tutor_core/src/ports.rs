//! crates/adaptive_tutor_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the pipeline's collaborators.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete database and generative-AI provider.

use crate::domain::{
    CacheEntry, ChatMessage, EnrichmentRecord, LearnerSession, Plan, Progress, SlideStatus,
    TrainingMaterial,
};
use crate::schema::ResponseSchema;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The AI backend no longer knows the context handle it was given.
    #[error("Context handle expired or unknown: {0}")]
    ContextExpired(String),
    #[error("Invalid response from backend: {0}")]
    InvalidResponse(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Material Context
//=========================================================================================

/// What a generation call uses to reference the training material.
#[derive(Debug, Clone)]
pub enum MaterialContext {
    /// A handle previously returned by `create_cached_context`.
    Cached { handle: String, material_hash: String },
    /// The raw material, sent along with the call (costlier).
    Inline(Arc<TrainingMaterial>),
}

impl MaterialContext {
    pub fn is_cached(&self) -> bool {
        matches!(self, MaterialContext::Cached { .. })
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Read-only access to trainer-supplied documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_material(&self, training_id: Uuid) -> PortResult<TrainingMaterial>;
}

/// Persistence for sessions, plans, chat logs and cache entries.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Learner Sessions ---
    async fn create_learner_session(&self, session: LearnerSession) -> PortResult<LearnerSession>;

    async fn get_learner_session(&self, session_id: Uuid) -> PortResult<LearnerSession>;

    async fn update_enriched_profile(
        &self,
        session_id: Uuid,
        profile: &EnrichmentRecord,
    ) -> PortResult<()>;

    async fn update_progress(&self, session_id: Uuid, progress: &Progress) -> PortResult<()>;

    // --- Plans & Slides ---
    async fn get_plan(&self, session_id: Uuid) -> PortResult<Option<Plan>>;

    /// Stores `plan` unless one already exists for the session; returns the stored plan.
    async fn save_plan(&self, plan: Plan) -> PortResult<Plan>;

    async fn update_slide_content(
        &self,
        session_id: Uuid,
        slide_index: usize,
        status: SlideStatus,
        content: Option<&str>,
        generated_at: Option<DateTime<Utc>>,
    ) -> PortResult<()>;

    async fn mark_slide_viewed(
        &self,
        session_id: Uuid,
        slide_index: usize,
        viewed_at: DateTime<Utc>,
    ) -> PortResult<()>;

    // --- Chat Log ---
    async fn append_chat_message(&self, message: ChatMessage) -> PortResult<()>;

    /// The latest `limit` messages of a session, oldest first.
    async fn recent_chat_messages(&self, session_id: Uuid, limit: usize) -> PortResult<Vec<ChatMessage>>;

    // --- AI-side Cache Entries ---
    async fn get_cache_entry(&self, material_hash: &str) -> PortResult<Option<CacheEntry>>;

    async fn upsert_cache_entry(&self, entry: &CacheEntry) -> PortResult<()>;

    /// Removes the entry only while it still carries `provider_handle`. Returns whether a row went away.
    async fn delete_cache_entry(&self, material_hash: &str, provider_handle: &str) -> PortResult<bool>;
}

/// The generative-AI backend.
#[async_trait]
pub trait GenerativeAiService: Send + Sync {
    /// Loads a material on the backend side and returns a reusable handle.
    async fn create_cached_context(
        &self,
        material: &TrainingMaterial,
        ttl: Duration,
    ) -> PortResult<String>;

    /// Produces a JSON document meant to match `schema`. The caller validates it.
    async fn generate_structured(
        &self,
        context: &MaterialContext,
        prompt: &str,
        schema: &ResponseSchema,
    ) -> PortResult<serde_json::Value>;

    /// Answers a learner message given grounding text and prior turns.
    async fn chat(
        &self,
        context: &MaterialContext,
        grounding: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> PortResult<String>;
}
