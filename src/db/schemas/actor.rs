//! Actor (user) document schema
//!
//! Holds the denormalized bookmark mirror and the notification preferences
//! consulted by the fan-out.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for actors
pub const ACTOR_COLLECTION: &str = "users";

/// Account standing as resolved by the session layer
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActorStatus {
    #[default]
    Active,
    Suspended,
    Banned,
}

/// Per-category notification switches
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NotificationPreferences {
    #[serde(default = "default_true")]
    pub likes: bool,
    #[serde(default = "default_true")]
    pub comments: bool,
    #[serde(default = "default_true")]
    pub replies: bool,
    #[serde(default = "default_true")]
    pub follows: bool,
    #[serde(default = "default_true")]
    pub mentions: bool,
    #[serde(default = "default_true")]
    pub votes: bool,
    #[serde(default = "default_true")]
    pub bookmarks: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            likes: true,
            comments: true,
            replies: true,
            follows: true,
            mentions: true,
            votes: true,
            bookmarks: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Actor document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ActorDoc {
    #[serde(rename = "_id")]
    pub id: String,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    pub username: String,

    #[serde(default)]
    pub status: ActorStatus,

    /// Global notification switch
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,

    #[serde(default)]
    pub notification_preferences: NotificationPreferences,

    /// Ids of bookmarked content (mirror of each content's bookmark set)
    #[serde(default)]
    pub bookmarks: Vec<String>,

    /// Legacy copy of `bookmarks`, written in the same update.
    // TODO: drop once every client reads `bookmarks`; needs a backfill-free migration removing the field.
    #[serde(default)]
    pub saved_posts: Vec<String>,
}

impl ActorDoc {
    /// Create a new active actor with default preferences
    pub fn new(id: &str, username: &str) -> Self {
        Self {
            id: id.to_string(),
            metadata: Metadata::new(),
            username: username.to_string(),
            status: ActorStatus::Active,
            notifications_enabled: true,
            notification_preferences: NotificationPreferences::default(),
            bookmarks: Vec::new(),
            saved_posts: Vec::new(),
        }
    }
}

impl IntoIndexes for ActorDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "username": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("username_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ActorDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_preferences_default_to_enabled() {
        let document = doc! { "_id": "u1", "username": "ana" };
        let actor: ActorDoc = bson::from_document(document).unwrap();
        assert!(actor.notifications_enabled);
        assert!(actor.notification_preferences.likes);
        assert_eq!(actor.status, ActorStatus::Active);
        assert!(actor.bookmarks.is_empty());
    }

    #[test]
    fn test_partial_preferences() {
        let document = doc! {
            "_id": "u2",
            "username": "ben",
            "notification_preferences": { "likes": false },
        };
        let actor: ActorDoc = bson::from_document(document).unwrap();
        assert!(!actor.notification_preferences.likes);
        assert!(actor.notification_preferences.follows);
    }
}
