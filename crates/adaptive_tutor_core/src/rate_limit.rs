//! crates/adaptive_tutor_core/src/rate_limit.rs
//!
//! The process-wide admission gate in front of every AI-backend call.
//!
//! A sliding one-minute window counts admitted calls. Callers that find the
//! window full queue in arrival order and back off exponentially until either a
//! slot frees up or their maximum wait runs out.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Backoff between admission attempts never grows past this.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Proof that a call was admitted within the budget.
#[derive(Debug)]
pub struct Permit {
    pub admitted_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected {
    /// Time until the oldest call in the window leaves it.
    pub retry_after: Duration,
}

pub struct RateLimiter {
    admitted: Mutex<VecDeque<Instant>>,
    /// Waiters acquire this first; tokio's mutex hands it out in FIFO order.
    queue: tokio::sync::Mutex<()>,
    limit: usize,
    window: Duration,
    max_wait: Duration,
    initial_backoff: Duration,
}

impl RateLimiter {
    /// A limiter admitting `per_minute` calls in any sliding minute.
    pub fn per_minute(per_minute: u32, max_wait: Duration, initial_backoff: Duration) -> Self {
        Self::with_window(per_minute, Duration::from_secs(60), max_wait, initial_backoff)
    }

    pub fn with_window(limit: u32, window: Duration, max_wait: Duration, initial_backoff: Duration) -> Self {
        Self {
            admitted: Mutex::new(VecDeque::new()),
            queue: tokio::sync::Mutex::new(()),
            limit: limit as usize,
            window,
            max_wait,
            initial_backoff,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::per_minute(
            config.rate_limit_per_minute,
            config.rate_limit_max_wait,
            config.rate_limit_initial_backoff,
        )
    }

    /// Admits one call if the window has room. Never waits.
    pub fn admit(&self) -> Result<Permit, Rejected> {
        let now = Instant::now();
        let mut admitted = self.admitted.lock().unwrap_or_else(|p| p.into_inner());
        while let Some(oldest) = admitted.front() {
            if now.duration_since(*oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if admitted.len() < self.limit {
            admitted.push_back(now);
            return Ok(Permit { admitted_at: now });
        }

        let retry_after = admitted
            .front()
            .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(self.window);
        Err(Rejected { retry_after })
    }

    /// Admits one call, queueing with bounded exponential backoff when the budget is spent.
    pub async fn acquire(&self) -> Result<Permit, PipelineError> {
        let started = Instant::now();
        let deadline = started + self.max_wait;

        let _turn = match tokio::time::timeout_at(deadline, self.queue.lock()).await {
            Ok(turn) => turn,
            Err(_) => return Err(self.exhausted(started)),
        };

        let mut backoff = self.initial_backoff;
        loop {
            let rejected = match self.admit() {
                Ok(permit) => return Ok(permit),
                Err(rejected) => rejected,
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(self.exhausted(started));
            }
            let delay = backoff.min(rejected.retry_after).min(deadline - now);
            debug!("Rate budget spent, retrying admission in {:?}", delay);
            tokio::time::sleep(delay).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Calls admitted in the current window.
    pub fn in_window(&self) -> usize {
        let now = Instant::now();
        let admitted = self.admitted.lock().unwrap_or_else(|p| p.into_inner());
        admitted
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }

    fn exhausted(&self, started: Instant) -> PipelineError {
        let waited = started.elapsed();
        warn!("AI backend rate budget exhausted after {:?}", waited);
        PipelineError::RateLimitExceeded { waited }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(limit: u32, max_wait_secs: u64) -> RateLimiter {
        RateLimiter::per_minute(limit, Duration::from_secs(max_wait_secs), Duration::from_millis(250))
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_the_budget_then_rejects() {
        let limiter = limiter(3, 0);
        for _ in 0..3 {
            assert!(limiter.admit().is_ok());
        }
        let rejected = limiter.admit().unwrap_err();
        assert_eq!(rejected.retry_after, Duration::from_secs(60));
        assert_eq!(limiter.in_window(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_budget_allocates_lazily() {
        let limiter = limiter(u32::MAX, 0);
        for _ in 0..5 {
            limiter.admit().unwrap();
        }
        assert_eq!(limiter.in_window(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_after_a_minute() {
        let limiter = limiter(2, 0);
        limiter.admit().unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.admit().unwrap();
        assert!(limiter.admit().is_err());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.admit().is_ok());
        assert!(limiter.admit().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_fails_when_budget_stays_exhausted() {
        let limiter = limiter(1, 5);
        limiter.acquire().await.unwrap();

        let err = limiter.acquire().await.unwrap_err();
        match err {
            PipelineError::RateLimitExceeded { waited } => assert!(waited >= Duration::from_secs(5)),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(limiter.in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_the_window_to_free_a_slot() {
        let limiter = limiter(1, 120);
        limiter.acquire().await.unwrap();

        let started = Instant::now();
        limiter.acquire().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_never_exceed_the_budget() {
        let limiter = Arc::new(limiter(5, 1));
        let mut tasks = Vec::new();
        for _ in 0..12 {
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move { limiter.acquire().await.is_ok() }));
        }
        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }
}
