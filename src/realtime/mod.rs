//! Real-time broadcast
//!
//! Pub/sub for content channels (`content:<kind>:<id>`) and private
//! per-subscriber channels. Delivery is best-effort: callers run publishes
//! as detached tasks and only log failures.

pub mod local;
pub mod nats;

pub use local::{ConnectionId, LocalBroadcaster};
pub use nats::NatsBroadcaster;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::tasks::TaskQueue;
use crate::types::Result;

/// Event published on a content channel after a counter changes
pub const EVENT_INTERACTION_UPDATED: &str = "interaction_updated";
/// Event published on a content channel after a vote changes the aggregate
pub const EVENT_ORIENTATION_UPDATED: &str = "orientation_updated";
/// Event pushed to a recipient's private channel
pub const EVENT_NOTIFICATION: &str = "notification";

/// One message delivered to a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    /// Content channel, or `None` for a private push
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub event: String,
    pub payload: Value,
}

/// Real-time transport
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Subscribe a connection to a channel
    async fn join_channel(&self, connection_id: &str, channel: &str) -> Result<()>;

    /// Publish to every member of a channel
    async fn publish(&self, channel: &str, event: &str, payload: Value) -> Result<()>;

    /// Push to one subscriber's private channel.
    /// `Ok(false)` when the subscriber is not connected; that is not an error.
    async fn publish_to_subscriber(&self, subscriber_id: &str, event: &str, payload: Value) -> Result<bool>;
}

/// Submit a channel publish as a detached task; failures are only logged
pub fn publish_detached(
    tasks: &TaskQueue,
    broadcaster: &Arc<dyn Broadcaster>,
    channel: String,
    event: &'static str,
    payload: Value,
) {
    let broadcaster = Arc::clone(broadcaster);
    tasks.submit(event, async move { broadcaster.publish(&channel, event, payload).await });
}
