//! Notification fan-out and inbox
//!
//! [`Notifier`] filters an event against the recipient's switches, persists
//! at most one record per event and pushes it to the recipient's private
//! channel. [`Inbox`] serves the recipient-side lifecycle.

pub mod fanout;
pub mod inbox;

pub use fanout::{preference_enabled, NotificationEvent, Notifier};
pub use inbox::Inbox;

use serde::{Deserialize, Serialize};

use crate::db::schemas::{ContentRef, NotificationDoc, NotificationType};

/// Notification as returned to clients and pushed in real time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationView {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_content: Option<ContentRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_comment_id: Option<String>,
    pub read: bool,
    /// RFC 3339
    pub created_at: String,
}

impl From<&NotificationDoc> for NotificationView {
    fn from(doc: &NotificationDoc) -> Self {
        Self {
            id: doc.id.clone(),
            notification_type: doc.notification_type,
            sender_id: doc.sender_id.clone(),
            related_content: doc.related_content.clone(),
            related_comment_id: doc.related_comment_id.clone(),
            read: doc.read,
            created_at: doc.created_at.to_chrono().to_rfc3339(),
        }
    }
}
