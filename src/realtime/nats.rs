//! NATS-backed broadcaster
//!
//! Events are published on subjects that the WebSocket edge subscribes to:
//!
//! - `<prefix>.channel.<channel>.<event>` for content channels
//! - `<prefix>.subscriber.<subscriber>.<event>` for private pushes
//! - `<prefix>.control.join` for channel membership changes
//!
//! The broker does not report whether anyone is listening, so a private push
//! counts as delivered once NATS accepted it.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::debug;

use super::{Broadcaster, RealtimeMessage};
use crate::nats::NatsClient;
use crate::types::{EngineError, Result};

/// Broadcaster publishing to NATS subjects
#[derive(Clone)]
pub struct NatsBroadcaster {
    client: NatsClient,
    prefix: String,
}

impl NatsBroadcaster {
    pub fn new(client: NatsClient, prefix: &str) -> Self {
        Self {
            client,
            prefix: prefix.to_string(),
        }
    }

    pub fn channel_subject(&self, channel: &str, event: &str) -> String {
        format!("{}.channel.{}.{}", self.prefix, subject_token(channel), subject_token(event))
    }

    pub fn subscriber_subject(&self, subscriber_id: &str, event: &str) -> String {
        format!(
            "{}.subscriber.{}.{}",
            self.prefix,
            subject_token(subscriber_id),
            subject_token(event)
        )
    }

    fn control_subject(&self, action: &str) -> String {
        format!("{}.control.{}", self.prefix, action)
    }

    async fn send<T: serde::Serialize>(&self, subject: &str, body: &T) -> Result<()> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| EngineError::Realtime(format!("Encode failed: {}", e)))?;
        self.client.publish(subject, Bytes::from(payload)).await?;
        debug!(subject = subject, "Published realtime event");
        Ok(())
    }
}

/// Make an id safe to use as a single subject token
fn subject_token(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

#[async_trait]
impl Broadcaster for NatsBroadcaster {
    async fn join_channel(&self, connection_id: &str, channel: &str) -> Result<()> {
        let subject = self.control_subject("join");
        self.send(&subject, &json!({ "connection_id": connection_id, "channel": channel }))
            .await
    }

    async fn publish(&self, channel: &str, event: &str, payload: Value) -> Result<()> {
        let message = RealtimeMessage {
            channel: Some(channel.to_string()),
            event: event.to_string(),
            payload,
        };
        self.send(&self.channel_subject(channel, event), &message).await
    }

    async fn publish_to_subscriber(&self, subscriber_id: &str, event: &str, payload: Value) -> Result<bool> {
        let message = RealtimeMessage {
            channel: None,
            event: event.to_string(),
            payload,
        };
        self.send(&self.subscriber_subject(subscriber_id, event), &message)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_token_escapes_wildcards() {
        assert_eq!(subject_token("content:post:a.b"), "content:post:a_b");
        assert_eq!(subject_token("x > y*"), "x___y_");
        assert_eq!(subject_token("3f1c"), "3f1c");
    }
}
