//! Rate-limit gate
//!
//! The policy is pluggable; the engine only asks whether an action may
//! proceed and rejects with `RateLimited` before touching the store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

use super::Action;
use crate::types::{EngineError, Result};

/// Rate limiter consulted before every mutating action
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, actor_id: &str, action: Action) -> Result<()>;
}

/// Allows everything
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn check(&self, _actor_id: &str, _action: Action) -> Result<()> {
        Ok(())
    }
}

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Actions allowed per actor per window
    pub max_actions: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_actions: 120,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn from_args(args: &crate::config::Args) -> Self {
        Self {
            max_actions: args.rate_limit_per_minute,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window limiter keyed by actor
pub struct WindowRateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Window>,
}

impl WindowRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Drop windows that ended; returns how many were removed
    pub fn cleanup(&self) -> usize {
        let before = self.windows.len();
        let window = self.config.window;
        self.windows.retain(|_, w| w.started.elapsed() < window);
        before.saturating_sub(self.windows.len())
    }
}

#[async_trait]
impl RateLimiter for WindowRateLimiter {
    async fn check(&self, actor_id: &str, action: Action) -> Result<()> {
        let now = Instant::now();
        let mut entry = self.windows.entry(actor_id.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.config.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.config.max_actions {
            debug!(actor_id = actor_id, action = %action, "Rate limit exceeded");
            return Err(EngineError::RateLimited(format!(
                "{} actions per {}s exceeded",
                self.config.max_actions,
                self.config.window.as_secs()
            )));
        }

        entry.count += 1;
        Ok(())
    }
}

/// Periodically drop ended windows; abort the handle at shutdown
pub fn spawn_cleanup_task(limiter: Arc<WindowRateLimiter>) -> JoinHandle<()> {
    let interval = limiter.config.window;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.cleanup();
            debug!(removed = removed, "Rate limit windows swept");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_window_limits_per_actor() {
        let limiter = WindowRateLimiter::new(RateLimitConfig {
            max_actions: 2,
            window: Duration::from_secs(60),
        });

        assert!(limiter.check("a1", Action::Like).await.is_ok());
        assert!(limiter.check("a1", Action::Bookmark).await.is_ok());
        assert!(matches!(
            limiter.check("a1", Action::Vote).await,
            Err(EngineError::RateLimited(_))
        ));
        assert!(limiter.check("a2", Action::Like).await.is_ok());
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = WindowRateLimiter::new(RateLimitConfig {
            max_actions: 1,
            window: Duration::from_millis(10),
        });

        assert!(limiter.check("a1", Action::Like).await.is_ok());
        assert!(limiter.check("a1", Action::Like).await.is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(limiter.check("a1", Action::Like).await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_drops_stale_windows() {
        let limiter = WindowRateLimiter::new(RateLimitConfig {
            max_actions: 5,
            window: Duration::from_millis(5),
        });
        limiter.check("a1", Action::Report).await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(limiter.cleanup(), 1);
    }

    #[tokio::test]
    async fn test_unlimited() {
        for _ in 0..1000 {
            assert!(Unlimited.check("a1", Action::Like).await.is_ok());
        }
    }
}
