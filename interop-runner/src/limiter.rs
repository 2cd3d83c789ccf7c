// Copyright (c) The interop-metrics Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token-bucket admission control for object fetches.
//!
//! A single limiter instance is constructed by the orchestrator and shared
//! (by `Arc`) across every fetch task, so total in-flight network operations
//! are bounded regardless of how many runs and objects exist.

use tokio::{
    sync::Mutex,
    time::{Duration, Instant},
};

/// Token-bucket rate limiter guarding object fetches.
///
/// `admit` takes one token, waiting for a refill if the bucket is empty.
/// Admissions are debited in arrival order: a caller that finds the bucket
/// empty reserves the next token and sleeps out its own delay, so waiters
/// don't stampede on refill.
#[derive(Debug)]
pub struct FetchLimiter {
    state: Option<Mutex<BucketState>>,
    rate_per_sec: f64,
    burst: f64,
}

#[derive(Debug)]
struct BucketState {
    /// May go negative: a negative balance is the reservation debt of
    /// admissions already promised.
    tokens: f64,
    last_refill: Instant,
}

impl FetchLimiter {
    /// Default refill rate, in admissions per second.
    pub const DEFAULT_RATE: u32 = 50;
    /// Default bucket capacity.
    pub const DEFAULT_BURST: u32 = 50;

    /// Creates a limiter with the given refill rate and bucket capacity.
    /// The bucket starts full.
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        Self {
            state: Some(Mutex::new(BucketState {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            })),
            rate_per_sec: f64::from(rate_per_sec),
            burst: f64::from(burst),
        }
    }

    /// Creates a limiter with the default rate and capacity.
    pub fn with_defaults() -> Self {
        Self::new(Self::DEFAULT_RATE, Self::DEFAULT_BURST)
    }

    /// Creates a disabled limiter: `admit` returns immediately.
    pub fn disabled() -> Self {
        Self {
            state: None,
            rate_per_sec: 0.0,
            burst: 0.0,
        }
    }

    /// Blocks until an admission token is available.
    pub async fn admit(&self) {
        let Some(state) = &self.state else {
            return;
        };

        let wait = {
            let mut bucket = state.lock().await;
            let now = Instant::now();
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst);
            bucket.last_refill = now;
            bucket.tokens -= 1.0;
            if bucket.tokens >= 0.0 {
                None
            } else {
                Some(Duration::from_secs_f64(-bucket.tokens / self.rate_per_sec))
            }
        };

        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
    }
}
