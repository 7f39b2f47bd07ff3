use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::RecipientId,
    transport::{port::Transport, types::MediaRef},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* two outbound sends (global flood control).
    pub global_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(34), // ~30/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// Transport decorator that spaces outbound sends.
///
/// Concurrent attempts of one batch reserve consecutive slots, so a batch of
/// `n` recipients takes at least `(n - 1) * global_min_interval` to settle.
pub struct ThrottledTransport {
    inner: Arc<dyn Transport>,
    global: Mutex<IntervalLimiter>,
}

impl ThrottledTransport {
    pub fn new(inner: Arc<dyn Transport>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
        }
    }

    async fn throttle(&self) {
        let wait = { self.global.lock().await.reserve() };
        if wait > Duration::ZERO {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl Transport for ThrottledTransport {
    async fn send_text(&self, to: &RecipientId, text: &str) -> Result<()> {
        self.throttle().await;
        self.inner.send_text(to, text).await
    }

    async fn send_photo(&self, to: &RecipientId, media: &MediaRef, caption: &str) -> Result<()> {
        self.throttle().await;
        self.inner.send_photo(to, media, caption).await
    }
}
