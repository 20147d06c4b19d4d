//! In-process broadcaster
//!
//! Connections are registered with an unbounded tokio channel; the transport
//! edge (WebSocket handler) drains the receiver. Used in dev mode and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::{Broadcaster, RealtimeMessage};
use crate::types::{EngineError, Result};

pub type ConnectionId = String;

/// Connection entry in the registry
struct ConnectionEntry {
    subscriber_id: String,
    tx: mpsc::UnboundedSender<RealtimeMessage>,
}

/// Connection registry and channel membership
#[derive(Default)]
pub struct LocalBroadcaster {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    /// channel -> member connections
    channels: DashMap<String, HashSet<ConnectionId>>,
    count: AtomicUsize,
}

impl LocalBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `subscriber_id`; drain the receiver to deliver
    pub fn connect(&self, subscriber_id: &str) -> (ConnectionId, mpsc::UnboundedReceiver<RealtimeMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4().to_string();
        self.connections.insert(
            connection_id.clone(),
            ConnectionEntry {
                subscriber_id: subscriber_id.to_string(),
                tx,
            },
        );
        self.count.fetch_add(1, Ordering::Relaxed);
        debug!(
            connection_id = %connection_id,
            subscriber_id = subscriber_id,
            count = self.count.load(Ordering::Relaxed),
            "Realtime connection registered"
        );
        (connection_id, rx)
    }

    /// Remove a connection and its channel memberships
    pub fn disconnect(&self, connection_id: &str) {
        if self.connections.remove(connection_id).is_some() {
            self.count.fetch_sub(1, Ordering::Relaxed);
            self.channels.iter_mut().for_each(|mut members| {
                members.remove(connection_id);
            });
            self.channels.retain(|_, members| !members.is_empty());
            debug!(connection_id = connection_id, "Realtime connection removed");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Members of a channel
    pub fn channel_size(&self, channel: &str) -> usize {
        self.channels.get(channel).map(|m| m.len()).unwrap_or(0)
    }

    /// Send to one connection; a closed receiver disconnects it
    fn deliver(&self, connection_id: &str, message: RealtimeMessage) -> bool {
        let sent = match self.connections.get(connection_id) {
            Some(entry) => entry.tx.send(message).is_ok(),
            None => return false,
        };
        if !sent {
            self.disconnect(connection_id);
        }
        sent
    }
}

#[async_trait]
impl Broadcaster for LocalBroadcaster {
    async fn join_channel(&self, connection_id: &str, channel: &str) -> Result<()> {
        if !self.connections.contains_key(connection_id) {
            return Err(EngineError::Realtime(format!("unknown connection {connection_id}")));
        }
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(connection_id.to_string());
        debug!(connection_id = connection_id, channel = channel, "Joined channel");
        Ok(())
    }

    async fn publish(&self, channel: &str, event: &str, payload: Value) -> Result<()> {
        let members: Vec<ConnectionId> = match self.channels.get(channel) {
            Some(members) => members.iter().cloned().collect(),
            None => return Ok(()),
        };

        let message = RealtimeMessage {
            channel: Some(channel.to_string()),
            event: event.to_string(),
            payload,
        };
        let delivered = members
            .iter()
            .filter(|id| self.deliver(id, message.clone()))
            .count();
        debug!(channel = channel, event = event, delivered = delivered, "Published");
        Ok(())
    }

    async fn publish_to_subscriber(&self, subscriber_id: &str, event: &str, payload: Value) -> Result<bool> {
        let targets: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| entry.subscriber_id == subscriber_id)
            .map(|entry| entry.key().clone())
            .collect();

        let message = RealtimeMessage {
            channel: None,
            event: event.to_string(),
            payload,
        };
        let delivered = targets
            .iter()
            .filter(|id| self.deliver(id, message.clone()))
            .count();
        if delivered == 0 {
            debug!(subscriber_id = subscriber_id, event = event, "Subscriber not connected");
        }
        Ok(delivered > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_channel_members_only() {
        let broadcaster = LocalBroadcaster::new();
        let (alice, mut alice_rx) = broadcaster.connect("alice");
        let (_bob, mut bob_rx) = broadcaster.connect("bob");

        broadcaster.join_channel(&alice, "content:post:1").await.unwrap();
        broadcaster
            .publish("content:post:1", "interaction_updated", json!({"count": 1}))
            .await
            .unwrap();

        let message = alice_rx.try_recv().unwrap();
        assert_eq!(message.channel.as_deref(), Some("content:post:1"));
        assert_eq!(message.event, "interaction_updated");
        assert_eq!(message.payload["count"], 1);
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_private_push_reports_connectivity() {
        let broadcaster = LocalBroadcaster::new();
        let (_conn, mut rx) = broadcaster.connect("alice");

        assert!(broadcaster
            .publish_to_subscriber("alice", "notification", json!({}))
            .await
            .unwrap());
        assert!(rx.try_recv().is_ok());

        assert!(!broadcaster
            .publish_to_subscriber("carol", "notification", json!({}))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_closed_receiver_is_pruned() {
        let broadcaster = LocalBroadcaster::new();
        let (conn, rx) = broadcaster.connect("alice");
        broadcaster.join_channel(&conn, "content:short:9").await.unwrap();
        drop(rx);

        broadcaster.publish("content:short:9", "interaction_updated", json!({})).await.unwrap();

        assert_eq!(broadcaster.connection_count(), 0);
        assert_eq!(broadcaster.channel_size("content:short:9"), 0);
    }

    #[tokio::test]
    async fn test_join_unknown_connection_fails() {
        let broadcaster = LocalBroadcaster::new();
        let result = broadcaster.join_channel("nope", "content:post:1").await;
        assert!(matches!(result, Err(EngineError::Realtime(_))));
    }
}
