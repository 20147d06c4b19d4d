//! Notification document schema
//!
//! One record per triggering event. `event_id` carries a unique index so a
//! replayed event cannot persist a second record.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::ContentRef;

/// Collection name for notifications
pub const NOTIFICATION_COLLECTION: &str = "notifications";

/// Kinds of notification events
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    PostLike,
    CommentLike,
    PostComment,
    CommentReply,
    NewFollower,
    Mention,
    PostVote,
    PostBookmark,
    PostRemoved,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::PostLike => "post_like",
            NotificationType::CommentLike => "comment_like",
            NotificationType::PostComment => "post_comment",
            NotificationType::CommentReply => "comment_reply",
            NotificationType::NewFollower => "new_follower",
            NotificationType::Mention => "mention",
            NotificationType::PostVote => "post_vote",
            NotificationType::PostBookmark => "post_bookmark",
            NotificationType::PostRemoved => "post_removed",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NotificationDoc {
    #[serde(rename = "_id")]
    pub id: String,

    /// Identity of the triggering event
    pub event_id: String,

    #[serde(rename = "type")]
    pub notification_type: NotificationType,

    pub recipient_id: String,

    pub sender_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_content: Option<ContentRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_comment_id: Option<String>,

    #[serde(default)]
    pub read: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime>,

    pub created_at: DateTime,
}

impl IntoIndexes for NotificationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "event_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("event_id_unique".to_string())
                        .build(),
                ),
            ),
            // Inbox listing
            (
                doc! { "recipient_id": 1, "created_at": -1 },
                Some(IndexOptions::builder().name("inbox_index".to_string()).build()),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::ContentKind;

    #[test]
    fn test_type_serializes_as_snake_case() {
        let notification = NotificationDoc {
            id: "n1".into(),
            event_id: "e1".into(),
            notification_type: NotificationType::NewFollower,
            recipient_id: "b".into(),
            sender_id: "a".into(),
            related_content: Some(ContentRef::new(ContentKind::Post, "p1")),
            related_comment_id: None,
            read: false,
            read_at: None,
            created_at: DateTime::now(),
        };
        let document = bson::to_document(&notification).unwrap();
        assert_eq!(document.get_str("type").unwrap(), "new_follower");
        assert!(!document.contains_key("related_comment_id"));
        assert_eq!(NotificationType::PostRemoved.to_string(), "post_removed");
    }
}
