//! MongoDB implementation of the store traits
//!
//! Every mutation is one `update_one`, `update_many` or `find_one_and_update`
//! whose filter carries the guard (liveness, membership) so the server applies
//! the check and the write atomically on a single document.

use async_trait::async_trait;
use bson::{doc, Bson, DateTime, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::ReturnDocument,
    Collection,
};
use tracing::{debug, warn};

use crate::db::mongo::{stamp_created, unavailable, MongoClient};
use crate::db::schemas::{
    ActorDoc, ContentDoc, ContentKind, ContentRef, InteractionKind, InteractionUser,
    NotificationDoc, OrientationCategory, ReportAggregate, ReportDoc, ReportStatus, Voter,
    ACTOR_COLLECTION, NOTIFICATION_COLLECTION, REPORT_COLLECTION,
};
use crate::db::store::{ActorStore, ContentStore, NotificationStore, Page, ReportStore};
use crate::types::{EngineError, Result};

/// Duplicate key error code
const DUPLICATE_KEY: i32 = 11000;

const VOTERS_PATH: &str = "political_orientation.voters";

/// MongoDB-backed store for every collection the engine touches
#[derive(Clone)]
pub struct MongoStore {
    posts: Collection<ContentDoc>,
    shorts: Collection<ContentDoc>,
    questions: Collection<ContentDoc>,
    actors: Collection<ActorDoc>,
    notifications: Collection<NotificationDoc>,
    reports: Collection<ReportDoc>,
}

impl MongoStore {
    /// Open every collection and apply schema indexes
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            posts: mongo.collection(ContentKind::Post.collection()).await?,
            shorts: mongo.collection(ContentKind::Short.collection()).await?,
            questions: mongo.collection(ContentKind::Question.collection()).await?,
            actors: mongo.collection(ACTOR_COLLECTION).await?,
            notifications: mongo.collection(NOTIFICATION_COLLECTION).await?,
            reports: mongo.collection(REPORT_COLLECTION).await?,
        })
    }

    fn contents(&self, kind: ContentKind) -> &Collection<ContentDoc> {
        match kind {
            ContentKind::Post => &self.posts,
            ContentKind::Short => &self.shorts,
            ContentKind::Question => &self.questions,
        }
    }

    /// `find_one_and_update` returning the post-image, `None` when the guard missed
    async fn guarded_update(
        &self,
        target: &ContentRef,
        filter: Document,
        update: impl Into<mongodb::options::UpdateModifications>,
    ) -> Result<Option<ContentDoc>> {
        let updated = self
            .contents(target.kind)
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| unavailable("Update", e))?;

        if updated.is_none() {
            debug!(content = %target, "Guarded update did not match");
        }
        Ok(updated)
    }
}

/// Filter matching one live content document
fn live_filter(id: &str) -> Document {
    doc! { "_id": id, "metadata.is_deleted": { "$ne": true } }
}

fn to_bson<T: serde::Serialize>(value: &T) -> Result<Bson> {
    bson::to_bson(value).map_err(|e| EngineError::Internal(format!("BSON encode failed: {e}")))
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY
    )
}

fn bson_as_u64(value: Option<&Bson>) -> u64 {
    match value {
        Some(Bson::Int32(n)) => (*n).max(0) as u64,
        Some(Bson::Int64(n)) => (*n).max(0) as u64,
        Some(Bson::Double(n)) => n.max(0.0) as u64,
        _ => 0,
    }
}

#[async_trait]
impl ContentStore for MongoStore {
    async fn insert_content(&self, mut content: ContentDoc) -> Result<()> {
        stamp_created(&mut content);
        self.contents(content.kind)
            .insert_one(&content)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    EngineError::InvalidState(format!("content {} already exists", content.id))
                } else {
                    unavailable("Insert", e)
                }
            })?;
        Ok(())
    }

    async fn find_content(&self, target: &ContentRef) -> Result<Option<ContentDoc>> {
        self.contents(target.kind)
            .find_one(doc! { "_id": &target.id })
            .await
            .map_err(|e| unavailable("Find", e))
    }

    async fn find_contents(&self, ids: &[String]) -> Result<Vec<ContentDoc>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = doc! {
            "_id": { "$in": ids.to_vec() },
            "metadata.is_deleted": { "$ne": true },
        };

        let mut found = Vec::with_capacity(ids.len());
        for kind in ContentKind::ALL {
            let cursor = self
                .contents(kind)
                .find(filter.clone())
                .await
                .map_err(|e| unavailable("Find", e))?;
            let mut batch: Vec<ContentDoc> = cursor
                .try_collect()
                .await
                .map_err(|e| unavailable("Cursor read", e))?;
            found.append(&mut batch);
        }
        found.sort_by(|a, b| b.metadata.created_at.cmp(&a.metadata.created_at));
        Ok(found)
    }

    async fn list_live(&self, kind: ContentKind, page: Page) -> Result<Vec<ContentDoc>> {
        let cursor = self
            .contents(kind)
            .find(doc! { "metadata.is_deleted": { "$ne": true } })
            .sort(doc! { "metadata.created_at": -1, "_id": 1 })
            .skip(page.skip)
            .limit(page.limit)
            .await
            .map_err(|e| unavailable("Find", e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| unavailable("Cursor read", e))
    }

    async fn count_live(&self, kind: ContentKind) -> Result<u64> {
        self.contents(kind)
            .count_documents(doc! { "metadata.is_deleted": { "$ne": true } })
            .await
            .map_err(|e| unavailable("Count", e))
    }

    async fn add_member(
        &self,
        target: &ContentRef,
        kind: InteractionKind,
        member: InteractionUser,
    ) -> Result<Option<ContentDoc>> {
        let users_path = kind.users_path();

        let mut filter = live_filter(&target.id);
        filter.insert(format!("{users_path}.actor_id"), doc! { "$ne": &member.actor_id });

        let mut push = Document::new();
        push.insert(users_path, to_bson(&member)?);
        let mut inc = Document::new();
        inc.insert(kind.count_path(), 1_i64);

        let update = doc! {
            "$push": push,
            "$inc": inc,
            "$set": { "metadata.updated_at": DateTime::now() },
        };
        self.guarded_update(target, filter, update).await
    }

    async fn remove_member(
        &self,
        target: &ContentRef,
        kind: InteractionKind,
        actor_id: &str,
    ) -> Result<Option<ContentDoc>> {
        let users_path = kind.users_path();
        let count_path = kind.count_path();

        let mut filter = live_filter(&target.id);
        filter.insert(format!("{users_path}.actor_id"), actor_id);

        // Pipeline update: pull and floored decrement in one document write
        let mut set = Document::new();
        set.insert(
            users_path.clone(),
            doc! {
                "$filter": {
                    "input": format!("${users_path}"),
                    "cond": { "$ne": ["$$this.actor_id", actor_id] },
                }
            },
        );
        set.insert(
            count_path.clone(),
            doc! { "$max": [0_i64, { "$subtract": [format!("${count_path}"), 1_i64] }] },
        );
        set.insert("metadata.updated_at", DateTime::now());

        self.guarded_update(target, filter, vec![doc! { "$set": set }]).await
    }

    async fn record_vote(&self, target: &ContentRef, voter: Voter) -> Result<Option<ContentDoc>> {
        let mut filter = live_filter(&target.id);
        filter.insert(format!("{VOTERS_PATH}.actor_id"), doc! { "$ne": &voter.actor_id });

        let mut push = Document::new();
        push.insert(VOTERS_PATH, to_bson(&voter)?);
        let mut inc = Document::new();
        inc.insert(voter.category.count_path(), 1_i64);

        let update = doc! {
            "$push": push,
            "$inc": inc,
            "$set": { "metadata.updated_at": DateTime::now() },
        };
        self.guarded_update(target, filter, update).await
    }

    async fn change_vote(
        &self,
        target: &ContentRef,
        actor_id: &str,
        from: OrientationCategory,
        to: OrientationCategory,
        at: DateTime,
    ) -> Result<Option<ContentDoc>> {
        let mut filter = live_filter(&target.id);
        filter.insert(
            VOTERS_PATH,
            doc! { "$elemMatch": { "actor_id": actor_id, "category": from.as_str() } },
        );

        let mut inc = Document::new();
        inc.insert(from.count_path(), -1_i64);
        inc.insert(to.count_path(), 1_i64);

        let update = doc! {
            "$inc": inc,
            "$set": {
                "political_orientation.voters.$.category": to.as_str(),
                "political_orientation.voters.$.voted_at": at,
                "metadata.updated_at": at,
            },
        };
        self.guarded_update(target, filter, update).await
    }

    async fn soft_delete(&self, target: &ContentRef, at: DateTime) -> Result<bool> {
        let result = self
            .contents(target.kind)
            .update_one(
                live_filter(&target.id),
                doc! {
                    "$set": {
                        "metadata.is_deleted": true,
                        "metadata.deleted_at": at,
                        "metadata.updated_at": at,
                    }
                },
            )
            .await
            .map_err(|e| unavailable("Soft delete", e))?;
        Ok(result.modified_count == 1)
    }

    async fn contents_with_member(
        &self,
        kind: InteractionKind,
        actor_id: &str,
    ) -> Result<Vec<ContentRef>> {
        let mut filter = Document::new();
        filter.insert(format!("{}.actor_id", kind.users_path()), actor_id);

        let mut refs = Vec::new();
        for content_kind in ContentKind::ALL {
            let cursor = self
                .contents(content_kind)
                .clone_with_type::<Document>()
                .find(filter.clone())
                .projection(doc! { "_id": 1 })
                .await
                .map_err(|e| unavailable("Find", e))?;
            let ids: Vec<Document> = cursor
                .try_collect()
                .await
                .map_err(|e| unavailable("Cursor read", e))?;
            for id_doc in ids {
                match id_doc.get_str("_id") {
                    Ok(id) => refs.push(ContentRef::new(content_kind, id)),
                    Err(e) => warn!(kind = %content_kind, error = %e, "Skipping content with non-string id"),
                }
            }
        }
        Ok(refs)
    }
}

#[async_trait]
impl ActorStore for MongoStore {
    async fn insert_actor(&self, mut actor: ActorDoc) -> Result<()> {
        stamp_created(&mut actor);
        self.actors.insert_one(&actor).await.map_err(|e| {
            if is_duplicate_key(&e) {
                EngineError::InvalidState(format!("actor {} already exists", actor.id))
            } else {
                unavailable("Insert", e)
            }
        })?;
        Ok(())
    }

    async fn find_actor(&self, actor_id: &str) -> Result<Option<ActorDoc>> {
        self.actors
            .find_one(doc! { "_id": actor_id, "metadata.is_deleted": { "$ne": true } })
            .await
            .map_err(|e| unavailable("Find", e))
    }

    async fn add_bookmark(&self, actor_id: &str, content_id: &str) -> Result<bool> {
        let result = self
            .actors
            .update_one(
                doc! { "_id": actor_id },
                doc! {
                    "$addToSet": { "bookmarks": content_id, "saved_posts": content_id },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await
            .map_err(|e| unavailable("Update", e))?;
        Ok(result.matched_count > 0)
    }

    async fn remove_bookmark(&self, actor_id: &str, content_id: &str) -> Result<bool> {
        let result = self
            .actors
            .update_one(
                doc! { "_id": actor_id },
                doc! {
                    "$pull": { "bookmarks": content_id, "saved_posts": content_id },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await
            .map_err(|e| unavailable("Update", e))?;
        Ok(result.matched_count > 0)
    }
}

#[async_trait]
impl NotificationStore for MongoStore {
    async fn insert_notification(&self, notification: NotificationDoc) -> Result<bool> {
        match self.notifications.insert_one(&notification).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => {
                debug!(event_id = %notification.event_id, "Notification already recorded for event");
                Ok(false)
            }
            Err(e) => Err(unavailable("Insert", e)),
        }
    }

    async fn list_notifications(
        &self,
        recipient_id: &str,
        unread_only: bool,
        page: Page,
    ) -> Result<Vec<NotificationDoc>> {
        let mut filter = doc! { "recipient_id": recipient_id };
        if unread_only {
            filter.insert("read", false);
        }

        let cursor = self
            .notifications
            .find(filter)
            .sort(doc! { "created_at": -1, "_id": -1 })
            .skip(page.skip)
            .limit(page.limit)
            .await
            .map_err(|e| unavailable("Find", e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| unavailable("Cursor read", e))
    }

    async fn count_unread(&self, recipient_id: &str) -> Result<u64> {
        self.notifications
            .count_documents(doc! { "recipient_id": recipient_id, "read": false })
            .await
            .map_err(|e| unavailable("Count", e))
    }

    async fn mark_read(&self, id: &str, recipient_id: &str, at: DateTime) -> Result<bool> {
        let result = self
            .notifications
            .update_one(
                doc! { "_id": id, "recipient_id": recipient_id },
                vec![doc! {
                    "$set": {
                        "read": true,
                        "read_at": { "$ifNull": ["$read_at", at] },
                    }
                }],
            )
            .await
            .map_err(|e| unavailable("Update", e))?;
        Ok(result.matched_count > 0)
    }

    async fn mark_all_read(&self, recipient_id: &str, at: DateTime) -> Result<u64> {
        let result = self
            .notifications
            .update_many(
                doc! { "recipient_id": recipient_id, "read": false },
                doc! { "$set": { "read": true, "read_at": at } },
            )
            .await
            .map_err(|e| unavailable("Update", e))?;
        Ok(result.modified_count)
    }

    async fn delete_notification(&self, id: &str, recipient_id: &str) -> Result<bool> {
        let result = self
            .notifications
            .delete_one(doc! { "_id": id, "recipient_id": recipient_id })
            .await
            .map_err(|e| unavailable("Delete", e))?;
        Ok(result.deleted_count > 0)
    }
}

#[async_trait]
impl ReportStore for MongoStore {
    async fn insert_report(&self, report: ReportDoc) -> Result<()> {
        self.reports
            .insert_one(&report)
            .await
            .map_err(|e| unavailable("Insert", e))?;
        Ok(())
    }

    async fn pending_aggregates(&self, target: Option<&ContentRef>) -> Result<Vec<ReportAggregate>> {
        let mut matcher = doc! { "status": ReportStatus::Pending.as_str() };
        if let Some(target) = target {
            matcher.insert("target_type", target.kind.as_str());
            matcher.insert("target_id", &target.id);
        }

        let pipeline = vec![
            doc! { "$match": matcher },
            doc! {
                "$group": {
                    "_id": { "target_type": "$target_type", "target_id": "$target_id" },
                    "report_count": { "$sum": 1 },
                    "reporters": { "$addToSet": "$reporter_id" },
                }
            },
            doc! {
                "$project": {
                    "report_count": 1,
                    "distinct_reporters": { "$size": "$reporters" },
                }
            },
            doc! { "$sort": { "_id.target_type": 1, "_id.target_id": 1 } },
        ];

        let cursor = self
            .reports
            .aggregate(pipeline)
            .await
            .map_err(|e| unavailable("Aggregate", e))?;
        let groups: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| unavailable("Cursor read", e))?;

        let mut aggregates = Vec::with_capacity(groups.len());
        for group in groups {
            let Ok(key) = group.get_document("_id") else {
                warn!("Skipping report group without key");
                continue;
            };
            let kind = key.get_str("target_type").ok().and_then(|k| k.parse::<ContentKind>().ok());
            let (Some(kind), Ok(target_id)) = (kind, key.get_str("target_id")) else {
                warn!(group = %key, "Skipping report group with unknown target");
                continue;
            };
            aggregates.push(ReportAggregate {
                target: ContentRef::new(kind, target_id),
                report_count: bson_as_u64(group.get("report_count")),
                distinct_reporters: bson_as_u64(group.get("distinct_reporters")),
            });
        }
        Ok(aggregates)
    }

    async fn resolve_reports(
        &self,
        target: &ContentRef,
        status: ReportStatus,
        reviewed_by: &str,
        at: DateTime,
    ) -> Result<u64> {
        let result = self
            .reports
            .update_many(
                doc! {
                    "target_type": target.kind.as_str(),
                    "target_id": &target.id,
                    "status": { "$in": [ReportStatus::Pending.as_str(), ReportStatus::Reviewed.as_str()] },
                },
                doc! {
                    "$set": {
                        "status": status.as_str(),
                        "reviewed_at": at,
                        "reviewed_by": reviewed_by,
                    }
                },
            )
            .await
            .map_err(|e| unavailable("Update", e))?;
        Ok(result.modified_count)
    }

    async fn reports_for(&self, target: &ContentRef) -> Result<Vec<ReportDoc>> {
        let cursor = self
            .reports
            .find(doc! { "target_type": target.kind.as_str(), "target_id": &target.id })
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await
            .map_err(|e| unavailable("Find", e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| unavailable("Cursor read", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Round trips against a server need a running MongoDB instance.

    #[test]
    fn test_bson_as_u64_accepts_numeric_widths() {
        assert_eq!(bson_as_u64(Some(&Bson::Int32(5))), 5);
        assert_eq!(bson_as_u64(Some(&Bson::Int64(7))), 7);
        assert_eq!(bson_as_u64(Some(&Bson::Double(3.0))), 3);
        assert_eq!(bson_as_u64(Some(&Bson::Int32(-2))), 0);
        assert_eq!(bson_as_u64(None), 0);
    }

    #[test]
    fn test_live_filter_excludes_deleted() {
        let filter = live_filter("p1");
        assert_eq!(filter.get_str("_id").unwrap(), "p1");
        assert!(filter.get_document("metadata.is_deleted").is_ok());
    }
}
