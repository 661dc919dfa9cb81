//! crates/adaptive_tutor_core/src/domain.rs
//!
//! Defines the pure, core data structures for the tutoring pipeline.
//! These structs are independent of any database; the ones that are stored as
//! structured JSON (the enriched profile) derive serde.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Training Material & AI-side Cache
//=========================================================================================

/// A document supplied by a trainer. Immutable once stored.
#[derive(Debug, Clone)]
pub struct TrainingMaterial {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub text: String,
    /// SHA-256 hex digest of `text`; the key of the AI-side cache.
    pub content_hash: String,
}

impl TrainingMaterial {
    /// Builds a material and derives its content hash.
    pub fn new(id: Uuid, owner_id: Uuid, title: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let content_hash = content_hash(&text);
        Self {
            id,
            owner_id,
            title: title.into(),
            text,
            content_hash,
        }
    }
}

/// Hex-encoded SHA-256 of a document's text.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// A reusable AI-side context handle for one material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub material_hash: String,
    pub provider_handle: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ttl_hours: u32,
}

impl CacheEntry {
    pub fn new(material_hash: String, provider_handle: String, now: DateTime<Utc>, ttl_hours: u32) -> Self {
        Self {
            material_hash,
            provider_handle,
            created_at: now,
            expires_at: now + Duration::hours(i64::from(ttl_hours)),
            ttl_hours,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

//=========================================================================================
// Learner Session
//=========================================================================================

/// The answers a learner gave in the intake questionnaire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub level: String,
    pub learning_style: String,
    pub job: String,
    pub sector: String,
    pub country: String,
    pub language: String,
}

/// Counters kept alongside the enriched profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentHistory {
    pub first_enriched_at: Option<DateTime<Utc>>,
    pub total_enrichments: u32,
    pub last_updated_at: Option<DateTime<Utc>>,
}

/// The cumulative profile built from conversation analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub learning_style_observed: Option<String>,
    pub comprehension_level: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    pub objectives: Option<String>,
    pub engagement_patterns: Option<String>,
    #[serde(default)]
    pub enrichment_history: EnrichmentHistory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub slides_viewed: usize,
    pub time_spent_secs: u64,
    pub last_slide_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct LearnerSession {
    pub id: Uuid,
    pub training_id: Uuid,
    pub profile: LearnerProfile,
    pub enriched_profile: EnrichmentRecord,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
}

impl LearnerSession {
    pub fn new(training_id: Uuid, profile: LearnerProfile) -> Self {
        Self {
            id: Uuid::new_v4(),
            training_id,
            profile,
            enriched_profile: EnrichmentRecord::default(),
            progress: Progress::default(),
            created_at: Utc::now(),
        }
    }
}

//=========================================================================================
// Plan & Slides
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideStatus {
    Pending,
    Generating,
    Ready,
}

impl SlideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlideStatus::Pending => "pending",
            SlideStatus::Generating => "generating",
            SlideStatus::Ready => "ready",
        }
    }
}

impl fmt::Display for SlideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlideStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SlideStatus::Pending),
            "generating" => Ok(SlideStatus::Generating),
            "ready" => Ok(SlideStatus::Ready),
            other => Err(format!("unknown slide status '{}'", other)),
        }
    }
}

/// One unit of content. `index` is the slide's position in the flattened plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slide {
    pub index: usize,
    pub module_index: usize,
    pub submodule_index: usize,
    pub title: String,
    pub status: SlideStatus,
    pub content: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
}

impl Slide {
    pub fn pending(index: usize, module_index: usize, submodule_index: usize, title: String) -> Self {
        Self {
            index,
            module_index,
            submodule_index,
            title,
            status: SlideStatus::Pending,
            content: None,
            generated_at: None,
            viewed_at: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == SlideStatus::Ready
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSubmodule {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanModule {
    pub title: String,
    pub submodules: Vec<PlanSubmodule>,
}

/// The module/submodule skeleton plus the flattened slide list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub session_id: Uuid,
    pub modules: Vec<PlanModule>,
    pub slides: Vec<Slide>,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn slide(&self, index: usize) -> Option<&Slide> {
        self.slides.get(index)
    }

    pub fn ready_count(&self) -> usize {
        self.slides.iter().filter(|s| s.is_ready()).count()
    }

    pub fn viewed_count(&self) -> usize {
        self.slides.iter().filter(|s| s.viewed_at.is_some()).count()
    }
}

/// How an already generated slide should be rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationMode {
    Simplify,
    Deepen,
}

//=========================================================================================
// Conversation
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    Learner,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::Learner => "learner",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learner" => Ok(ChatRole::Learner),
            "assistant" => Ok(ChatRole::Assistant),
            other => Err(format!("unknown chat role '{}'", other)),
        }
    }
}

/// A single entry of the append-only chat log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub learner_session_id: Uuid,
    pub slide_index: usize,
    pub role: ChatRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(learner_session_id: Uuid, slide_index: usize, role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            learner_session_id,
            slide_index,
            role,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_sha256_hex() {
        let a = TrainingMaterial::new(Uuid::new_v4(), Uuid::new_v4(), "A", "same text");
        let b = TrainingMaterial::new(Uuid::new_v4(), Uuid::new_v4(), "B", "same text");
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash.len(), 64);
        assert_ne!(a.content_hash, content_hash("other text"));
    }

    #[test]
    fn cache_entry_expires_after_ttl() {
        let now = Utc::now();
        let entry = CacheEntry::new("abc123".into(), "H".into(), now, 6);
        assert!(entry.is_live(now + Duration::hours(5)));
        assert!(!entry.is_live(now + Duration::hours(6)));
    }

    #[test]
    fn slide_status_parses_its_own_rendering() {
        for status in [SlideStatus::Pending, SlideStatus::Generating, SlideStatus::Ready] {
            assert_eq!(status.as_str().parse::<SlideStatus>(), Ok(status));
        }
        assert!("done".parse::<SlideStatus>().is_err());
    }
}
