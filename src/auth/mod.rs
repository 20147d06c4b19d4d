//! Request pre-checks
//!
//! Provides:
//! - Actor standing checks (suspended and banned actors cannot mutate)
//! - The rate-limit gate consulted before every mutating action

pub mod context;
pub mod rate_limit;

pub use context::{Action, ActorContext};
pub use rate_limit::{spawn_cleanup_task, RateLimitConfig, RateLimiter, Unlimited, WindowRateLimiter};
