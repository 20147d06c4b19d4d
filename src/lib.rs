//! Agora - interaction consistency and moderation engine
//!
//! Keeps like, dislike, bookmark and political-orientation state correct
//! under concurrent writers on a document store without transactions.
//!
//! ## Components
//!
//! - **Interactions**: guarded toggles, vote aggregation, the actor-side
//!   bookmark mirror and the cached feed read path
//! - **Notify**: preference-filtered, exactly-once notifications with
//!   real-time push, plus the recipient inbox
//! - **Moderation**: report intake and the periodic auto-moderation scan
//! - **Cache**: namespace-flushed TTL cache for anonymous reads
//! - **Realtime**: in-process or NATS-backed channel broadcast

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod engine;
pub mod interactions;
pub mod logging;
pub mod moderation;
pub mod nats;
pub mod notify;
pub mod realtime;
pub mod tasks;
pub mod types;

pub use config::Args;
pub use engine::Engine;
pub use types::{EngineError, Result};
