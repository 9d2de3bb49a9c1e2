//! Per-credential admission control for the generative backends.
//!
//! Each API key owns two independent constraints that must both pass before
//! a call is admitted:
//!
//! 1. a token bucket refilling continuously at `requests_per_minute / 60`
//!    tokens per second with burst capacity of twice the per-minute budget,
//!    which smooths bursts, and
//! 2. a rolling 60-second window of admission timestamps, which caps
//!    worst-case throughput at exactly the provider quota even when burst
//!    credit has accumulated.
//!
//! The window is checked first: while it already holds the per-minute
//! maximum, the caller sleeps until the oldest timestamp leaves the window
//! before the bucket is consulted at all. A separate semaphore bounds
//! concurrent in-flight calls per credential, independent of rate.

use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

struct RateLimiterState {
    tokens: f64,
    last_refill: Instant,
    window: VecDeque<Instant>,
}

/// One generation credential with its limiter state.
pub struct CredentialLimiter {
    key: String,
    requests_per_minute: u32,
    capacity: f64,
    state: Mutex<RateLimiterState>,
    in_flight: Arc<Semaphore>,
}

impl CredentialLimiter {
    pub fn new(key: String, requests_per_minute: u32, max_in_flight: usize) -> Self {
        let capacity = f64::from(requests_per_minute) * 2.0;
        Self {
            key,
            requests_per_minute,
            capacity,
            state: Mutex::new(RateLimiterState {
                tokens: capacity,
                last_refill: Instant::now(),
                window: VecDeque::new(),
            }),
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Block until one downstream call is permitted, then return the
    /// in-flight permit. Dropping the permit releases the concurrency slot;
    /// the rate admission itself is not returned.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        let permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .expect("in-flight semaphore closed");
        loop {
            // Read-refill-decrement happens as one critical section so
            // concurrent workers on the same credential cannot over-admit.
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                while let Some(&oldest) = state.window.front() {
                    if now.duration_since(oldest) >= WINDOW {
                        state.window.pop_front();
                    } else {
                        break;
                    }
                }
                if state.window.len() >= self.requests_per_minute as usize {
                    state
                        .window
                        .front()
                        .map(|&oldest| WINDOW.saturating_sub(now.duration_since(oldest)))
                } else {
                    let rate = f64::from(self.requests_per_minute) / 60.0;
                    let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                    state.tokens = (state.tokens + elapsed * rate).min(self.capacity);
                    state.last_refill = now;
                    if state.tokens >= 1.0 {
                        state.tokens -= 1.0;
                        state.window.push_back(now);
                        None
                    } else {
                        Some(Duration::from_secs_f64((1.0 - state.tokens) / rate))
                    }
                }
            };
            match wait {
                None => return permit,
                Some(delay) => tokio::time::sleep(delay).await,
            }
        }
    }
}

/// The set of available generation credentials.
#[derive(Clone)]
pub struct CredentialPool {
    limiters: Vec<Arc<CredentialLimiter>>,
}

impl CredentialPool {
    pub fn new(keys: &[String], requests_per_minute: u32, max_in_flight: usize) -> Self {
        Self {
            limiters: keys
                .iter()
                .map(|key| {
                    Arc::new(CredentialLimiter::new(
                        key.clone(),
                        requests_per_minute,
                        max_in_flight,
                    ))
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// All credentials in randomized order, so repeated batch sweeps spread
    /// work round-robin instead of always hammering the first key.
    pub fn shuffled(&self) -> Vec<Arc<CredentialLimiter>> {
        let mut limiters = self.limiters.clone();
        limiters.shuffle(&mut rand::thread_rng());
        limiters
    }

    /// An arbitrary credential for one-off calls (e.g. discovery fallback).
    pub fn any(&self) -> Option<Arc<CredentialLimiter>> {
        self.shuffled().into_iter().next()
    }
}
