//! Notification fan-out
//!
//! Never on the write path's critical section: interaction handlers call
//! [`Notifier::dispatch`], which submits [`Notifier::notify`] to the task
//! queue and returns immediately.

use bson::DateTime;
use std::sync::Arc;
use tracing::{debug, warn};

use super::NotificationView;
use crate::db::schemas::{ContentRef, NotificationDoc, NotificationPreferences, NotificationType};
use crate::db::store::{ActorStore, NotificationStore};
use crate::realtime::{Broadcaster, EVENT_NOTIFICATION};
use crate::tasks::TaskQueue;
use crate::types::Result;

/// One triggering event
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    /// Identity of the event; one record at most per id
    pub event_id: String,
    pub notification_type: NotificationType,
    pub recipient_id: String,
    pub sender_id: String,
    pub related_content: Option<ContentRef>,
    pub related_comment_id: Option<String>,
}

impl NotificationEvent {
    /// New event with a fresh identity
    pub fn new(notification_type: NotificationType, recipient_id: &str, sender_id: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            notification_type,
            recipient_id: recipient_id.to_string(),
            sender_id: sender_id.to_string(),
            related_content: None,
            related_comment_id: None,
        }
    }

    /// Use a deterministic identity for events that can only happen once
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = event_id.into();
        self
    }

    pub fn with_content(mut self, content: ContentRef) -> Self {
        self.related_content = Some(content);
        self
    }

    pub fn with_comment(mut self, comment_id: &str) -> Self {
        self.related_comment_id = Some(comment_id.to_string());
        self
    }

    fn into_record(self) -> NotificationDoc {
        NotificationDoc {
            id: uuid::Uuid::new_v4().to_string(),
            event_id: self.event_id,
            notification_type: self.notification_type,
            recipient_id: self.recipient_id,
            sender_id: self.sender_id,
            related_content: self.related_content,
            related_comment_id: self.related_comment_id,
            read: false,
            read_at: None,
            created_at: DateTime::now(),
        }
    }
}

/// Whether the per-category switch allows this type.
/// Types without a category (`post_removed`) are always allowed here.
pub fn preference_enabled(prefs: &NotificationPreferences, notification_type: NotificationType) -> bool {
    match notification_type {
        NotificationType::PostLike | NotificationType::CommentLike => prefs.likes,
        NotificationType::PostComment => prefs.comments,
        NotificationType::CommentReply => prefs.replies,
        NotificationType::NewFollower => prefs.follows,
        NotificationType::Mention => prefs.mentions,
        NotificationType::PostVote => prefs.votes,
        NotificationType::PostBookmark => prefs.bookmarks,
        NotificationType::PostRemoved => true,
    }
}

/// Preference-filtered persistence and real-time push
#[derive(Clone)]
pub struct Notifier {
    actors: Arc<dyn ActorStore>,
    notifications: Arc<dyn NotificationStore>,
    broadcaster: Arc<dyn Broadcaster>,
    tasks: TaskQueue,
}

impl Notifier {
    pub fn new(
        actors: Arc<dyn ActorStore>,
        notifications: Arc<dyn NotificationStore>,
        broadcaster: Arc<dyn Broadcaster>,
        tasks: TaskQueue,
    ) -> Self {
        Self {
            actors,
            notifications,
            broadcaster,
            tasks,
        }
    }

    /// Filter, persist and push one event.
    ///
    /// `Ok(None)` when the event is suppressed (self-notification, recipient
    /// missing or opted out) or was already recorded.
    pub async fn notify(&self, event: NotificationEvent) -> Result<Option<NotificationDoc>> {
        if event.recipient_id == event.sender_id {
            debug!(
                recipient_id = %event.recipient_id,
                notification_type = %event.notification_type,
                "Skipping self-notification"
            );
            return Ok(None);
        }

        let Some(recipient) = self.actors.find_actor(&event.recipient_id).await? else {
            debug!(recipient_id = %event.recipient_id, "Notification recipient not found");
            return Ok(None);
        };

        if !recipient.notifications_enabled {
            debug!(recipient_id = %recipient.id, "Recipient disabled notifications");
            return Ok(None);
        }

        if !preference_enabled(&recipient.notification_preferences, event.notification_type) {
            debug!(
                recipient_id = %recipient.id,
                notification_type = %event.notification_type,
                "Recipient disabled this notification category"
            );
            return Ok(None);
        }

        let record = event.into_record();
        if !self.notifications.insert_notification(record.clone()).await? {
            debug!(event_id = %record.event_id, "Event already notified");
            return Ok(None);
        }

        self.push(&record).await;
        Ok(Some(record))
    }

    /// Submit [`notify`](Self::notify) as a detached task
    pub fn dispatch(&self, event: NotificationEvent) {
        let notifier = self.clone();
        self.tasks.submit("notify", async move {
            notifier.notify(event).await.map(|_| ())
        });
    }

    /// Best-effort real-time push; never fails the notification
    async fn push(&self, record: &NotificationDoc) {
        let payload = match serde_json::to_value(NotificationView::from(record)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(notification_id = %record.id, error = %e, "Notification not serializable");
                return;
            }
        };

        match self
            .broadcaster
            .publish_to_subscriber(&record.recipient_id, EVENT_NOTIFICATION, payload)
            .await
        {
            Ok(true) => debug!(recipient_id = %record.recipient_id, "Notification pushed"),
            Ok(false) => debug!(recipient_id = %record.recipient_id, "Recipient offline, push skipped"),
            Err(e) => warn!(recipient_id = %record.recipient_id, error = %e, "Notification push failed"),
        }
    }
}
