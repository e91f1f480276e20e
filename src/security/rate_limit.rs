//! Token-bucket rate limiting for sandbox requests
//!
//! Every upload, execution and test run spawns disk or process work on the
//! host. A runaway agent loop can issue thousands of them per second, so the
//! server admits requests through a token bucket:
//!
//! ```text
//!   capacity = burst size          refill = tokens per second
//!   ┌─────────────┐
//!   │  ● ● ● ●    │ ◄── refill_rate tokens/sec, capped at capacity
//!   └─────────────┘
//!         │ request arrives
//!         ▼
//!   token available → consume 1, admit
//!   bucket empty    → reject with RateLimited (HTTP 429)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::SandboxError;

// Tokens are stored multiplied by SCALE so fractional refills accumulate
const SCALE: u64 = 1000;

/// Thread-safe token bucket
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum tokens in the bucket (burst capacity)
    capacity: u64,
    /// Tokens added per second
    refill_rate: f64,
    /// Current tokens, scaled
    tokens_scaled: AtomicU64,
    last_refill: Mutex<Instant>,
}

impl RateLimiter {
    /// Create a full bucket with `capacity` tokens refilled at `refill_rate`/sec
    pub fn new(capacity: u64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens_scaled: AtomicU64::new(capacity.saturating_mul(SCALE)),
            last_refill: Mutex::new(Instant::now()),
        }
    }

    /// Take one token; `false` means the caller is rate limited
    pub fn try_acquire(&self) -> bool {
        self.refill();

        let mut current = self.tokens_scaled.load(Ordering::Relaxed);
        loop {
            if current < SCALE {
                return false;
            }
            match self.tokens_scaled.compare_exchange_weak(
                current,
                current - SCALE,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Take one token or return the `RateLimited` error to hand back to the caller
    pub fn check(&self) -> Result<(), SandboxError> {
        if self.try_acquire() {
            Ok(())
        } else {
            Err(SandboxError::RateLimited {
                retry_after_ms: u64::try_from(self.retry_after().as_millis()).unwrap_or(u64::MAX),
            })
        }
    }

    /// Time until one more token becomes available
    pub fn retry_after(&self) -> Duration {
        if self.refill_rate > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.refill_rate).unwrap_or(Duration::MAX)
        } else {
            Duration::from_secs(1)
        }
    }

    fn refill(&self) {
        let now = Instant::now();
        // A poisoned clock only means another thread panicked mid-refill
        let mut last = match self.last_refill.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let elapsed = now.duration_since(*last);
        let to_add = (elapsed.as_secs_f64() * self.refill_rate * SCALE as f64) as u64;
        if to_add == 0 {
            return;
        }
        *last = now;

        let max_scaled = self.capacity.saturating_mul(SCALE);
        let _ = self
            .tokens_scaled
            .fetch_update(Ordering::SeqCst, Ordering::Relaxed, |current| {
                Some(current.saturating_add(to_add).min(max_scaled))
            });
    }

    /// Whole tokens currently available
    pub fn available_tokens(&self) -> u64 {
        self.tokens_scaled.load(Ordering::Relaxed) / SCALE
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}
