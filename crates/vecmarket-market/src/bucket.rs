//! Token-bucket throttles for the REST and WS-pull paths.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Interval slept while waiting for refill.
const RETRY_SLEEP: Duration = Duration::from_millis(10);

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Refill-rate throttle.
///
/// `acquire` blocks (asynchronously) until enough tokens accumulate; the
/// lock is only held for the refill bookkeeping, never across the sleep.
pub struct TokenBucket {
    capacity: f64,
    rps: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket holding `capacity` burst tokens refilled at `rps`
    /// tokens per second.
    pub fn new(capacity: u32, rps: f64) -> Self {
        Self {
            capacity: capacity as f64,
            rps,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take `cost` tokens, sleeping in 10 ms slices while the bucket is
    /// empty. Callers treat this as blocking; starvation is never surfaced.
    pub async fn acquire(&self, cost: f64) {
        loop {
            {
                let mut state = self.state.lock();
                let now = Instant::now();
                let dt = now.duration_since(state.last_refill).as_secs_f64();
                if dt > 0.0 {
                    state.tokens = (state.tokens + dt * self.rps).min(self.capacity);
                    state.last_refill = now;
                }
                if state.tokens >= cost {
                    state.tokens -= cost;
                    return;
                }
            }
            tokio::time::sleep(RETRY_SLEEP).await;
        }
    }

    /// Tokens currently available (after refill), for diagnostics.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        let now = Instant::now();
        let dt = now.duration_since(state.last_refill).as_secs_f64();
        if dt > 0.0 {
            state.tokens = (state.tokens + dt * self.rps).min(self.capacity);
            state.last_refill = now;
        }
        state.tokens
    }
}
