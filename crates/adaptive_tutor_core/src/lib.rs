pub mod cache;
pub mod config;
pub mod conversation;
pub mod domain;
pub mod enrichment;
pub mod error;
pub mod generator;
pub mod locks;
pub mod memory;
pub mod pipeline;
pub mod ports;
pub mod prompts;
pub mod rate_limit;
pub mod schema;

#[cfg(test)]
mod test_support;

pub use config::PipelineConfig;
pub use domain::{
    ChatMessage, ChatRole, EnrichmentRecord, LearnerProfile, LearnerSession, Plan, Progress, RegenerationMode, Slide,
    SlideStatus, TrainingMaterial,
};
pub use error::PipelineError;
pub use memory::InMemoryStore;
pub use pipeline::{LearningPipeline, ProgressReport};
pub use ports::{DatabaseService, DocumentStore, GenerativeAiService, MaterialContext, PortError, PortResult};
