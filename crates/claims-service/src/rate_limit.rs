//! Submission rate limiting
//!
//! A deterrent against form spam, not a security boundary: counters may
//! briefly over-admit under races and in-memory counters reset on restart.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// Decides whether a requester may submit another claim
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn allow(&self, identity: &str) -> bool;
}

/// Rate limit configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum submissions per window
    pub max_requests: u32,
    /// Window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// In-process fixed-window counter keyed by requester
#[derive(Debug)]
pub struct FixedWindowLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

/// Above this many tracked requesters, finished windows are dropped
const PRUNE_THRESHOLD: usize = 1024;

impl FixedWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn allow(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, w| w.reset_at > now);
        }

        match windows.get_mut(identity) {
            Some(window) if now <= window.reset_at => {
                if window.count >= self.config.max_requests {
                    return false;
                }
                window.count += 1;
                true
            }
            _ => {
                windows.insert(
                    identity.to_string(),
                    Window {
                        count: 1,
                        reset_at: now + self.config.window,
                    },
                );
                true
            }
        }
    }
}

/// Counter shared by every instance through Redis `INCR` + `EXPIRE`
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    config: RateLimitConfig,
}

impl RedisRateLimiter {
    pub fn new(conn: ConnectionManager, config: RateLimitConfig) -> Self {
        Self { conn, config }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn allow(&self, identity: &str) -> bool {
        let mut conn = self.conn.clone();
        let key = format!("ratelimit:claims:{}", identity);

        let count: u32 = match conn.incr(&key, 1).await {
            Ok(count) => count,
            Err(e) => {
                // Fail open: losing the limiter must not take submissions down
                warn!("Rate limiter unavailable, allowing request: {}", e);
                return true;
            }
        };

        if count == 1 {
            let window_secs = self.config.window.as_secs().max(1);
            let result: redis::RedisResult<()> = conn.expire(&key, window_secs as _).await;
            if let Err(e) = result {
                warn!("Failed to set rate limit window for {}: {}", identity, e);
            }
        }

        count <= self.config.max_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32) -> FixedWindowLimiter {
        FixedWindowLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(3600),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_allows_up_to_max() {
        let limiter = limiter(5);
        for _ in 0..5 {
            assert!(limiter.allow("203.0.113.7").await);
        }
        assert!(!limiter.allow("203.0.113.7").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identities_are_independent() {
        let limiter = limiter(1);
        assert!(limiter.allow("203.0.113.7").await);
        assert!(!limiter.allow("203.0.113.7").await);
        assert!(limiter.allow("198.51.100.2").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let limiter = limiter(2);
        assert!(limiter.allow("203.0.113.7").await);
        assert!(limiter.allow("203.0.113.7").await);
        assert!(!limiter.allow("203.0.113.7").await);

        tokio::time::advance(Duration::from_secs(3601)).await;
        assert!(limiter.allow("203.0.113.7").await);
    }
}
