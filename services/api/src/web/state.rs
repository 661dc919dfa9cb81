//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use adaptive_tutor_core::pipeline::LearningPipeline;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<LearningPipeline>,
    pub config: Arc<Config>,
}
