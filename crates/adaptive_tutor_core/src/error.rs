//! crates/adaptive_tutor_core/src/error.rs
//!
//! The error taxonomy of the content pipeline.

use crate::ports::PortError;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// Submitting the material to the AI backend failed. Callers fall back to uncached calls.
    #[error("Material cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("AI backend rate budget exhausted after waiting {waited:?}")]
    RateLimitExceeded { waited: Duration },

    /// Plan or slide generation failed or returned an invalid structure.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Never surfaced to the learner; only logged by the enrichment worker.
    #[error("Enrichment failed: {0}")]
    EnrichmentFailed(String),

    #[error("Chat failed: {0}")]
    ChatFailed(String),

    #[error("No plan has been generated for session {0}")]
    PlanNotReady(Uuid),

    #[error("Slide {index} is out of range (plan has {len} slides)")]
    SlideOutOfRange { index: usize, len: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Service Port Error: {0}")]
    Port(PortError),
}

impl From<PortError> for PipelineError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => PipelineError::NotFound(what),
            other => PipelineError::Port(other),
        }
    }
}

impl PipelineError {
    /// Whether the learner can simply try the same action again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::CacheUnavailable(_)
                | PipelineError::RateLimitExceeded { .. }
                | PipelineError::GenerationFailed(_)
                | PipelineError::ChatFailed(_)
        )
    }

    /// A generic message safe to show to a learner. Never includes provider details.
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::RateLimitExceeded { .. } => {
                "The tutor is busy right now. Please try again in a minute."
            }
            PipelineError::GenerationFailed(_) | PipelineError::CacheUnavailable(_) => {
                "This slide could not be prepared. Please try again."
            }
            PipelineError::ChatFailed(_) => "Something went wrong. Please try again.",
            PipelineError::PlanNotReady(_) => "Your course is not ready yet.",
            PipelineError::SlideOutOfRange { .. } => "This slide does not exist.",
            PipelineError::InvalidInput(_) => "The request could not be understood.",
            PipelineError::NotFound(_) => "The requested item was not found.",
            PipelineError::EnrichmentFailed(_) | PipelineError::Port(_) => {
                "An unexpected error occurred. Please try again."
            }
        }
    }
}
