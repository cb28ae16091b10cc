//! Local token-bucket rate limiting.
//!
//! Every outbound LLM call acquires one token before touching the network;
//! an empty bucket suspends the caller for the minimum refill delay rather
//! than failing.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with a fixed capacity and steady refill rate.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("refill_per_sec", &self.refill_per_sec)
            .finish()
    }
}

impl TokenBucket {
    /// Create a bucket that allows `rate` acquisitions per `interval`.
    ///
    /// The bucket starts full.
    pub fn new(rate: u32, interval: Duration) -> Self {
        let capacity = f64::from(rate.max(1));
        let refill_per_sec = capacity / interval.as_secs_f64().max(f64::EPSILON);
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_sec,
        }
    }

    /// Acquire one token, suspending until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                // Minimum delay until a whole token has accrued.
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };

            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limit: waiting for token");
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available (for diagnostics).
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
        state.tokens
    }
}
