//! Store traits
//!
//! The engine never reads a counter, computes and writes it back. Every
//! mutation below maps onto exactly one single-document atomic update in the
//! backing store, guarded so that it only applies when it changes membership.
//! A guarded method returns `None`/`false` when its guard did not match.

use async_trait::async_trait;
use bson::DateTime;
use std::sync::Arc;

use crate::db::schemas::{
    ActorDoc, ContentDoc, ContentKind, ContentRef, InteractionKind, InteractionUser,
    NotificationDoc, OrientationCategory, ReportAggregate, ReportDoc, ReportStatus, Voter,
};
use crate::types::Result;

/// Skip/limit window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub limit: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    /// Page number (1-based) and size, clamped to sane bounds
    pub fn new(page: u64, limit: i64) -> Self {
        let limit = limit.clamp(1, Self::MAX_LIMIT);
        Self {
            skip: page.saturating_sub(1) * limit as u64,
            limit,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_LIMIT)
    }
}

/// Content collections (posts, shorts, questions)
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn insert_content(&self, content: ContentDoc) -> Result<()>;

    /// Point read. Soft-deleted documents are returned too; callers decide.
    async fn find_content(&self, target: &ContentRef) -> Result<Option<ContentDoc>>;

    /// Live documents with the given ids, across every kind
    async fn find_contents(&self, ids: &[String]) -> Result<Vec<ContentDoc>>;

    /// Live documents of one kind, newest first
    async fn list_live(&self, kind: ContentKind, page: Page) -> Result<Vec<ContentDoc>>;

    async fn count_live(&self, kind: ContentKind) -> Result<u64>;

    /// Push `member` into the set and increment its count, only when the
    /// content is live and the actor is not already a member.
    async fn add_member(
        &self,
        target: &ContentRef,
        kind: InteractionKind,
        member: InteractionUser,
    ) -> Result<Option<ContentDoc>>;

    /// Pull the actor from the set and decrement its count (floored at 0),
    /// only when the content is live and the actor is a member.
    async fn remove_member(
        &self,
        target: &ContentRef,
        kind: InteractionKind,
        actor_id: &str,
    ) -> Result<Option<ContentDoc>>;

    /// Append a voter and increment its bucket, only when the actor has not voted.
    async fn record_vote(&self, target: &ContentRef, voter: Voter) -> Result<Option<ContentDoc>>;

    /// Move an existing vote between buckets in place, only when the voter
    /// still holds `from`.
    async fn change_vote(
        &self,
        target: &ContentRef,
        actor_id: &str,
        from: OrientationCategory,
        to: OrientationCategory,
        at: DateTime,
    ) -> Result<Option<ContentDoc>>;

    /// Flag as deleted; `false` when already deleted or missing
    async fn soft_delete(&self, target: &ContentRef, at: DateTime) -> Result<bool>;

    /// Every content (live or not) whose `kind` set contains the actor
    async fn contents_with_member(
        &self,
        kind: InteractionKind,
        actor_id: &str,
    ) -> Result<Vec<ContentRef>>;
}

/// Actor collection
#[async_trait]
pub trait ActorStore: Send + Sync {
    async fn insert_actor(&self, actor: ActorDoc) -> Result<()>;

    async fn find_actor(&self, actor_id: &str) -> Result<Option<ActorDoc>>;

    /// Set-add into `bookmarks` and the legacy `saved_posts` in one update.
    /// Returns whether the actor exists.
    async fn add_bookmark(&self, actor_id: &str, content_id: &str) -> Result<bool>;

    /// Set-remove from `bookmarks` and `saved_posts` in one update
    async fn remove_bookmark(&self, actor_id: &str, content_id: &str) -> Result<bool>;
}

/// Notification collection
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist; `false` when a record for the same event already exists
    async fn insert_notification(&self, notification: NotificationDoc) -> Result<bool>;

    async fn list_notifications(
        &self,
        recipient_id: &str,
        unread_only: bool,
        page: Page,
    ) -> Result<Vec<NotificationDoc>>;

    async fn count_unread(&self, recipient_id: &str) -> Result<u64>;

    /// Returns whether a matching record exists for this recipient
    async fn mark_read(&self, id: &str, recipient_id: &str, at: DateTime) -> Result<bool>;

    /// Returns number of records flipped to read
    async fn mark_all_read(&self, recipient_id: &str, at: DateTime) -> Result<u64>;

    async fn delete_notification(&self, id: &str, recipient_id: &str) -> Result<bool>;
}

/// Report collection
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert_report(&self, report: ReportDoc) -> Result<()>;

    /// Pending reports grouped by target, optionally for a single target
    async fn pending_aggregates(&self, target: Option<&ContentRef>) -> Result<Vec<ReportAggregate>>;

    /// Move every pending or reviewed report of `target` to `status`.
    /// Returns the number of reports changed.
    async fn resolve_reports(
        &self,
        target: &ContentRef,
        status: ReportStatus,
        reviewed_by: &str,
        at: DateTime,
    ) -> Result<u64>;

    async fn reports_for(&self, target: &ContentRef) -> Result<Vec<ReportDoc>>;
}

/// Handles to every collection, injected into the engine components
#[derive(Clone)]
pub struct Stores {
    pub content: Arc<dyn ContentStore>,
    pub actors: Arc<dyn ActorStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub reports: Arc<dyn ReportStore>,
}

impl Stores {
    /// Use one backend for every collection
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: ContentStore + ActorStore + NotificationStore + ReportStore + 'static,
    {
        Self {
            content: Arc::clone(&backend) as Arc<dyn ContentStore>,
            actors: Arc::clone(&backend) as Arc<dyn ActorStore>,
            notifications: Arc::clone(&backend) as Arc<dyn NotificationStore>,
            reports: backend as Arc<dyn ReportStore>,
        }
    }
}
