use anyhow::Result;
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Shared per-key limiter. `take` consumes one token and reports whether one
/// was available.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn take(&self, key: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    used: u32,
}

/// Fixed-window limiter held in process memory
#[derive(Debug)]
pub struct MemoryRateLimiter {
    tokens: u32,
    interval: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryRateLimiter {
    pub fn new(tokens: u32, interval: Duration) -> Self {
        Self {
            tokens,
            interval,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn take(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        windows.retain(|_, w| now.duration_since(w.started) < self.interval);

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            used: 0,
        });

        if window.used >= self.tokens {
            return Ok(false);
        }

        window.used += 1;
        Ok(true)
    }
}
