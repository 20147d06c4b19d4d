//! Content document schema
//!
//! Posts, shorts and questions share one shape and live in one collection per
//! kind. Every interaction kind carries a denormalized `count` next to the
//! `users` set it counts; the store keeps `count == users.len()` by only ever
//! changing both in the same single-document update.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Kind of publishable content
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Post,
    Short,
    Question,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [ContentKind::Post, ContentKind::Short, ContentKind::Question];

    /// Collection holding this kind
    pub fn collection(self) -> &'static str {
        match self {
            ContentKind::Post => "posts",
            ContentKind::Short => "shorts",
            ContentKind::Question => "questions",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Short => "short",
            ContentKind::Question => "question",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" | "posts" => Ok(ContentKind::Post),
            "short" | "shorts" => Ok(ContentKind::Short),
            "question" | "questions" => Ok(ContentKind::Question),
            other => Err(format!("unknown content kind '{other}'")),
        }
    }
}

/// Address of one content document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContentRef {
    pub kind: ContentKind,
    pub id: String,
}

impl ContentRef {
    pub fn new(kind: ContentKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    /// Real-time channel scoped to this content
    pub fn channel(&self) -> String {
        format!("content:{}:{}", self.kind, self.id)
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Interaction kinds tracked on content
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Likes,
    Dislikes,
    Bookmarks,
    Comments,
    Reports,
}

impl InteractionKind {
    /// Field name under `interactions`
    pub fn field(self) -> &'static str {
        match self {
            InteractionKind::Likes => "likes",
            InteractionKind::Dislikes => "dislikes",
            InteractionKind::Bookmarks => "bookmarks",
            InteractionKind::Comments => "comments",
            InteractionKind::Reports => "reports",
        }
    }

    /// Dotted path of the member set
    pub fn users_path(self) -> String {
        format!("interactions.{}.users", self.field())
    }

    /// Dotted path of the counter
    pub fn count_path(self) -> String {
        format!("interactions.{}.count", self.field())
    }
}

/// One member of an interaction set
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct InteractionUser {
    pub actor_id: String,
    pub timestamp: DateTime,
}

impl InteractionUser {
    pub fn now(actor_id: &str) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            timestamp: DateTime::now(),
        }
    }
}

/// Counter plus the member set it counts
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct InteractionSet {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub users: Vec<InteractionUser>,
}

impl InteractionSet {
    pub fn contains(&self, actor_id: &str) -> bool {
        self.users.iter().any(|u| u.actor_id == actor_id)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Interactions {
    #[serde(default)]
    pub likes: InteractionSet,
    #[serde(default)]
    pub dislikes: InteractionSet,
    #[serde(default)]
    pub bookmarks: InteractionSet,
    #[serde(default)]
    pub comments: InteractionSet,
    #[serde(default)]
    pub reports: InteractionSet,
}

impl Interactions {
    pub fn get(&self, kind: InteractionKind) -> &InteractionSet {
        match kind {
            InteractionKind::Likes => &self.likes,
            InteractionKind::Dislikes => &self.dislikes,
            InteractionKind::Bookmarks => &self.bookmarks,
            InteractionKind::Comments => &self.comments,
            InteractionKind::Reports => &self.reports,
        }
    }

    pub fn get_mut(&mut self, kind: InteractionKind) -> &mut InteractionSet {
        match kind {
            InteractionKind::Likes => &mut self.likes,
            InteractionKind::Dislikes => &mut self.dislikes,
            InteractionKind::Bookmarks => &mut self.bookmarks,
            InteractionKind::Comments => &mut self.comments,
            InteractionKind::Reports => &mut self.reports,
        }
    }
}

/// Political-orientation buckets in canonical order
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OrientationCategory {
    FarLeft,
    Left,
    Center,
    Right,
    FarRight,
}

impl OrientationCategory {
    /// Canonical ordering; earlier buckets win ties
    pub const ALL: [OrientationCategory; 5] = [
        OrientationCategory::FarLeft,
        OrientationCategory::Left,
        OrientationCategory::Center,
        OrientationCategory::Right,
        OrientationCategory::FarRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrientationCategory::FarLeft => "far_left",
            OrientationCategory::Left => "left",
            OrientationCategory::Center => "center",
            OrientationCategory::Right => "right",
            OrientationCategory::FarRight => "far_right",
        }
    }

    /// Dotted path of this bucket's counter
    pub fn count_path(self) -> String {
        format!("political_orientation.counts.{}", self.as_str())
    }
}

impl fmt::Display for OrientationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct OrientationCounts {
    #[serde(default)]
    pub far_left: i64,
    #[serde(default)]
    pub left: i64,
    #[serde(default)]
    pub center: i64,
    #[serde(default)]
    pub right: i64,
    #[serde(default)]
    pub far_right: i64,
}

impl OrientationCounts {
    pub fn get(&self, category: OrientationCategory) -> i64 {
        match category {
            OrientationCategory::FarLeft => self.far_left,
            OrientationCategory::Left => self.left,
            OrientationCategory::Center => self.center,
            OrientationCategory::Right => self.right,
            OrientationCategory::FarRight => self.far_right,
        }
    }

    pub fn get_mut(&mut self, category: OrientationCategory) -> &mut i64 {
        match category {
            OrientationCategory::FarLeft => &mut self.far_left,
            OrientationCategory::Left => &mut self.left,
            OrientationCategory::Center => &mut self.center,
            OrientationCategory::Right => &mut self.right,
            OrientationCategory::FarRight => &mut self.far_right,
        }
    }

    pub fn total(&self) -> i64 {
        OrientationCategory::ALL.iter().map(|c| self.get(*c)).sum()
    }
}

/// A single voter's current choice
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Voter {
    pub actor_id: String,
    pub category: OrientationCategory,
    pub voted_at: DateTime,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PoliticalOrientation {
    #[serde(default)]
    pub counts: OrientationCounts,
    #[serde(default)]
    pub voters: Vec<Voter>,
}

impl PoliticalOrientation {
    pub fn vote_of(&self, actor_id: &str) -> Option<&Voter> {
        self.voters.iter().find(|v| v.actor_id == actor_id)
    }
}

/// Content document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ContentDoc {
    /// Document ID (uuid string)
    #[serde(rename = "_id")]
    pub id: String,

    pub kind: ContentKind,

    /// Author of the content; receives interaction notifications
    pub owner_id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub interactions: Interactions,

    #[serde(default)]
    pub political_orientation: PoliticalOrientation,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,
}

impl Default for ContentDoc {
    fn default() -> Self {
        Self {
            id: String::new(),
            kind: ContentKind::Post,
            owner_id: String::new(),
            title: String::new(),
            body: String::new(),
            interactions: Interactions::default(),
            political_orientation: PoliticalOrientation::default(),
            metadata: Metadata::default(),
        }
    }
}

impl ContentDoc {
    /// Create a new live content document with a fresh id
    pub fn new(kind: ContentKind, owner_id: &str, title: &str, body: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            interactions: Interactions::default(),
            political_orientation: PoliticalOrientation::default(),
            metadata: Metadata::new(),
        }
    }

    pub fn content_ref(&self) -> ContentRef {
        ContentRef::new(self.kind, self.id.clone())
    }

    pub fn is_live(&self) -> bool {
        !self.metadata.is_deleted
    }
}

impl IntoIndexes for ContentDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "owner_id": 1 },
                Some(IndexOptions::builder().name("owner_index".to_string()).build()),
            ),
            // Feed listing: live content, newest first
            (
                doc! { "metadata.is_deleted": 1, "metadata.created_at": -1 },
                Some(IndexOptions::builder().name("feed_index".to_string()).build()),
            ),
            // Mirror diagnostics scan content by bookmarking actor
            (
                doc! { "interactions.bookmarks.users.actor_id": 1 },
                Some(IndexOptions::builder().name("bookmark_member_index".to_string()).build()),
            ),
        ]
    }
}

impl MutMetadata for ContentDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
