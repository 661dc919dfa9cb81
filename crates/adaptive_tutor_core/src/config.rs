//! crates/adaptive_tutor_core/src/config.rs
//!
//! Tunables of the pipeline. The service fills these from its environment.

use std::time::Duration;

pub const MIN_CACHE_TTL_HOURS: u32 = 6;
pub const MAX_CACHE_TTL_HOURS: u32 = 24;
/// Highest per-minute AI budget the service accepts from its environment.
pub const MAX_RATE_LIMIT_PER_MINUTE: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Lifetime of an AI-side material context. Clamped to 6..=24 hours.
    pub cache_ttl_hours: u32,
    pub rate_limit_per_minute: u32,
    /// Longest a caller queues for the rate budget before giving up.
    pub rate_limit_max_wait: Duration,
    pub rate_limit_initial_backoff: Duration,
    /// Client-side timeout applied to every AI-backend call.
    pub ai_call_timeout: Duration,
    /// Maximum length of array fields in the enriched profile.
    pub enrichment_array_cap: usize,
    pub enrichment_queue_capacity: usize,
    /// Number of past chat messages sent as conversation history.
    pub chat_history_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 12,
            rate_limit_per_minute: 60,
            rate_limit_max_wait: Duration::from_secs(30),
            rate_limit_initial_backoff: Duration::from_millis(250),
            ai_call_timeout: Duration::from_secs(90),
            enrichment_array_cap: 10,
            enrichment_queue_capacity: 256,
            chat_history_window: 10,
        }
    }
}

impl PipelineConfig {
    pub fn effective_cache_ttl_hours(&self) -> u32 {
        self.cache_ttl_hours
            .clamp(MIN_CACHE_TTL_HOURS, MAX_CACHE_TTL_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_clamped_to_supported_range() {
        let mut config = PipelineConfig::default();
        config.cache_ttl_hours = 1;
        assert_eq!(config.effective_cache_ttl_hours(), 6);
        config.cache_ttl_hours = 48;
        assert_eq!(config.effective_cache_ttl_hours(), 24);
        config.cache_ttl_hours = 8;
        assert_eq!(config.effective_cache_ttl_hours(), 8);
    }
}
