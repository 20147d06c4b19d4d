//! Political-orientation votes
//!
//! One vote per (content, voter). A first vote appends the voter and
//! increments its bucket; a changed vote moves one unit between buckets and
//! rewrites the voter entry in place. Both are single guarded updates, so
//! `sum(counts) == voters.len()` holds after every call.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{content_namespace, orientation_namespace, CacheKey, NamespaceCache, Viewer};
use crate::db::schemas::{
    ContentDoc, ContentRef, NotificationType, OrientationCategory, OrientationCounts, PoliticalOrientation, Voter,
};
use crate::db::store::ContentStore;
use crate::notify::{NotificationEvent, Notifier};
use crate::realtime::{publish_detached, Broadcaster, EVENT_ORIENTATION_UPDATED};
use crate::tasks::TaskQueue;
use crate::types::{EngineError, Result};

/// Guarded writes retried after losing a race to the same voter
const MAX_ATTEMPTS: usize = 3;

/// Map current and legacy spellings onto the canonical buckets
pub fn normalize_category(raw: &str) -> Result<OrientationCategory> {
    let key: String = raw
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect();

    let category = match key.as_str() {
        "far_left" | "farleft" | "extreme_left" | "strongly_left" | "very_left" => OrientationCategory::FarLeft,
        "left" | "lean_left" | "left_leaning" | "moderate_left" => OrientationCategory::Left,
        "center" | "centre" | "centrist" | "neutral" | "moderate" => OrientationCategory::Center,
        "right" | "lean_right" | "right_leaning" | "moderate_right" => OrientationCategory::Right,
        "far_right" | "farright" | "extreme_right" | "strongly_right" | "very_right" => OrientationCategory::FarRight,
        _ => {
            return Err(EngineError::InvalidState(format!(
                "unknown orientation category '{}'",
                raw.trim()
            )))
        }
    };
    Ok(category)
}

/// Aggregate of one content's votes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteOutcome {
    /// Highest bucket; ties go to the earliest in canonical order
    pub dominant_category: Option<OrientationCategory>,
    pub total_votes: i64,
    pub per_category_counts: OrientationCounts,
}

impl From<&PoliticalOrientation> for VoteOutcome {
    fn from(orientation: &PoliticalOrientation) -> Self {
        let counts = &orientation.counts;
        let mut dominant: Option<(OrientationCategory, i64)> = None;
        for category in OrientationCategory::ALL {
            let count = counts.get(category);
            if count > 0 && dominant.map_or(true, |(_, best)| count > best) {
                dominant = Some((category, count));
            }
        }
        Self {
            dominant_category: dominant.map(|(category, _)| category),
            total_votes: counts.total(),
            per_category_counts: counts.clone(),
        }
    }
}

/// Aggregate plus the viewer's own vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationView {
    #[serde(flatten)]
    pub summary: VoteOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_vote: Option<OrientationCategory>,
}

#[derive(Clone)]
pub struct VoteAggregator {
    content: Arc<dyn ContentStore>,
    cache: Arc<NamespaceCache>,
    broadcaster: Arc<dyn Broadcaster>,
    notifier: Notifier,
    tasks: TaskQueue,
}

enum Applied {
    First,
    Changed,
    Unchanged,
}

impl VoteAggregator {
    pub fn new(
        content: Arc<dyn ContentStore>,
        cache: Arc<NamespaceCache>,
        broadcaster: Arc<dyn Broadcaster>,
        notifier: Notifier,
        tasks: TaskQueue,
    ) -> Self {
        Self {
            content,
            cache,
            broadcaster,
            notifier,
            tasks,
        }
    }

    /// Cast or change `actor_id`'s vote on `target`
    pub async fn vote(&self, target: &ContentRef, actor_id: &str, category: &str) -> Result<VoteOutcome> {
        let category = normalize_category(category)?;

        let mut latest = self.load_live(target).await?;
        let mut applied = Applied::Unchanged;

        for attempt in 1..=MAX_ATTEMPTS {
            let written = match latest.political_orientation.vote_of(actor_id) {
                Some(existing) if existing.category == category => None,
                Some(existing) => {
                    let from = existing.category;
                    let doc = self
                        .content
                        .change_vote(target, actor_id, from, category, bson::DateTime::now())
                        .await?;
                    doc.map(|doc| (doc, Applied::Changed))
                }
                None => {
                    let voter = Voter {
                        actor_id: actor_id.to_string(),
                        category,
                        voted_at: bson::DateTime::now(),
                    };
                    let doc = self.content.record_vote(target, voter).await?;
                    doc.map(|doc| (doc, Applied::First))
                }
            };

            match written {
                Some((doc, how)) => {
                    latest = doc;
                    applied = how;
                    break;
                }
                None if latest.political_orientation.vote_of(actor_id).map(|v| v.category) == Some(category) => {
                    break;
                }
                None => {
                    debug!(content = %target, actor_id, attempt, "Vote lost a race, re-reading");
                    latest = self.load_live(target).await?;
                }
            }
        }

        if latest.political_orientation.vote_of(actor_id).map(|v| v.category) != Some(category) {
            warn!(content = %target, actor_id, attempts = MAX_ATTEMPTS, "Vote not recorded under contention");
            return Err(EngineError::StoreUnavailable(format!(
                "vote on {target} lost {MAX_ATTEMPTS} concurrent updates"
            )));
        }

        let outcome = VoteOutcome::from(&latest.political_orientation);

        if matches!(applied, Applied::First | Applied::Changed) {
            self.cache.invalidate_namespace(&orientation_namespace(target.kind));
            self.cache.invalidate_namespace(&content_namespace(target.kind));

            match serde_json::to_value(&outcome) {
                Ok(mut payload) => {
                    payload["content"] = serde_json::json!(target);
                    publish_detached(
                        &self.tasks,
                        &self.broadcaster,
                        target.channel(),
                        EVENT_ORIENTATION_UPDATED,
                        payload,
                    );
                }
                Err(e) => debug!(content = %target, error = %e, "Orientation payload not serializable"),
            }

            info!(
                content = %target,
                actor_id,
                category = %category,
                total_votes = outcome.total_votes,
                "Vote recorded"
            );
        }

        if matches!(applied, Applied::First) && latest.owner_id != actor_id {
            // A voter can only cast a first vote once per content
            self.notifier.dispatch(
                NotificationEvent::new(NotificationType::PostVote, &latest.owner_id, actor_id)
                    .with_event_id(format!("vote:{}:{}:{}", target.kind, target.id, actor_id))
                    .with_content(target.clone()),
            );
        }

        Ok(outcome)
    }

    /// Aggregate for a content; cached for anonymous viewers, with the
    /// viewer's own vote for authenticated ones
    pub async fn orientation(&self, target: &ContentRef, viewer: &Viewer) -> Result<OrientationView> {
        match viewer {
            Viewer::Anonymous => {
                let key = CacheKey::new(&orientation_namespace(target.kind), &format!("summary:{}", target.id));
                let summary = self
                    .cache
                    .read_through(viewer, &key, || async {
                        let content = self.load_live(target).await?;
                        Ok(VoteOutcome::from(&content.political_orientation))
                    })
                    .await?;
                Ok(OrientationView { summary, my_vote: None })
            }
            Viewer::Actor(actor_id) => {
                let content = self.load_live(target).await?;
                Ok(OrientationView {
                    summary: VoteOutcome::from(&content.political_orientation),
                    my_vote: content.political_orientation.vote_of(actor_id).map(|v| v.category),
                })
            }
        }
    }

    async fn load_live(&self, target: &ContentRef) -> Result<ContentDoc> {
        match self.content.find_content(target).await? {
            Some(content) if content.is_live() => Ok(content),
            _ => Err(EngineError::NotFound(format!("content {target}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{ActorDoc, ContentKind};
    use crate::db::store::ActorStore;
    use crate::db::MemoryStore;
    use crate::db::schemas::{InteractionKind, InteractionUser};
    use crate::db::store::Page;
    use crate::realtime::LocalBroadcaster;
    use async_trait::async_trait;
    use bson::DateTime;

    /// Content store where every vote write loses its guard
    struct AlwaysContended {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl ContentStore for AlwaysContended {
        async fn insert_content(&self, content: ContentDoc) -> Result<()> {
            self.inner.insert_content(content).await
        }

        async fn find_content(&self, target: &ContentRef) -> Result<Option<ContentDoc>> {
            self.inner.find_content(target).await
        }

        async fn find_contents(&self, ids: &[String]) -> Result<Vec<ContentDoc>> {
            self.inner.find_contents(ids).await
        }

        async fn list_live(&self, kind: ContentKind, page: Page) -> Result<Vec<ContentDoc>> {
            self.inner.list_live(kind, page).await
        }

        async fn count_live(&self, kind: ContentKind) -> Result<u64> {
            self.inner.count_live(kind).await
        }

        async fn add_member(
            &self,
            target: &ContentRef,
            kind: InteractionKind,
            member: InteractionUser,
        ) -> Result<Option<ContentDoc>> {
            self.inner.add_member(target, kind, member).await
        }

        async fn remove_member(
            &self,
            target: &ContentRef,
            kind: InteractionKind,
            actor_id: &str,
        ) -> Result<Option<ContentDoc>> {
            self.inner.remove_member(target, kind, actor_id).await
        }

        async fn record_vote(&self, _target: &ContentRef, _voter: Voter) -> Result<Option<ContentDoc>> {
            Ok(None)
        }

        async fn change_vote(
            &self,
            _target: &ContentRef,
            _actor_id: &str,
            _from: OrientationCategory,
            _to: OrientationCategory,
            _at: DateTime,
        ) -> Result<Option<ContentDoc>> {
            Ok(None)
        }

        async fn soft_delete(&self, target: &ContentRef, at: DateTime) -> Result<bool> {
            self.inner.soft_delete(target, at).await
        }

        async fn contents_with_member(&self, kind: InteractionKind, actor_id: &str) -> Result<Vec<ContentRef>> {
            self.inner.contents_with_member(kind, actor_id).await
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<NamespaceCache>,
        tasks: TaskQueue,
        votes: VoteAggregator,
        post: ContentRef,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        for id in ["owner", "a", "b", "c", "d"] {
            store.insert_actor(ActorDoc::new(id, id)).await.unwrap();
        }
        let content = ContentDoc::new(ContentKind::Short, "owner", "clip", "");
        let post = content.content_ref();
        store.insert_content(content).await.unwrap();

        let cache = Arc::new(NamespaceCache::with_defaults());
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(LocalBroadcaster::new());
        let tasks = TaskQueue::new();
        let notifier = Notifier::new(store.clone(), store.clone(), broadcaster.clone(), tasks.clone());
        let votes = VoteAggregator::new(store.clone(), cache.clone(), broadcaster, notifier, tasks.clone());
        Fixture {
            store,
            cache,
            tasks,
            votes,
            post,
        }
    }

    async fn orientation(f: &Fixture) -> PoliticalOrientation {
        f.store.find_content(&f.post).await.unwrap().unwrap().political_orientation
    }

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category("extreme_left").unwrap(), OrientationCategory::FarLeft);
        assert_eq!(normalize_category("Strongly-Left").unwrap(), OrientationCategory::FarLeft);
        assert_eq!(normalize_category("centre").unwrap(), OrientationCategory::Center);
        assert_eq!(normalize_category("neutral").unwrap(), OrientationCategory::Center);
        assert_eq!(normalize_category(" far right ").unwrap(), OrientationCategory::FarRight);
        assert!(matches!(normalize_category("sideways"), Err(EngineError::InvalidState(_))));
    }

    #[test]
    fn test_dominant_tie_breaks_to_canonical_order() {
        let mut orientation = PoliticalOrientation::default();
        orientation.counts.center = 2;
        orientation.counts.left = 2;
        let outcome = VoteOutcome::from(&orientation);
        assert_eq!(outcome.dominant_category, Some(OrientationCategory::Left));
        assert_eq!(outcome.total_votes, 4);

        assert_eq!(VoteOutcome::from(&PoliticalOrientation::default()).dominant_category, None);
    }

    #[tokio::test]
    async fn test_vote_change_keeps_single_membership() {
        let f = fixture().await;

        f.votes.vote(&f.post, "a", "left").await.unwrap();
        let outcome = f.votes.vote(&f.post, "a", "right").await.unwrap();
        assert_eq!(outcome.total_votes, 1);
        assert_eq!(outcome.dominant_category, Some(OrientationCategory::Right));

        let orientation = orientation(&f).await;
        assert_eq!(orientation.voters.len(), 1);
        assert_eq!(orientation.voters[0].category, OrientationCategory::Right);
        assert_eq!(orientation.counts.left, 0);
        assert_eq!(orientation.counts.right, 1);
    }

    #[tokio::test]
    async fn test_same_vote_is_noop() {
        let f = fixture().await;
        f.votes.vote(&f.post, "a", "center").await.unwrap();
        let outcome = f.votes.vote(&f.post, "a", "centre").await.unwrap();
        assert_eq!(outcome.total_votes, 1);
        assert_eq!(orientation(&f).await.voters.len(), 1);
    }

    #[tokio::test]
    async fn test_tie_scenario_through_votes() {
        let f = fixture().await;
        for (actor, category) in [("a", "center"), ("b", "left"), ("c", "center"), ("d", "left")] {
            f.votes.vote(&f.post, actor, category).await.unwrap();
        }
        let view = f.votes.orientation(&f.post, &Viewer::Anonymous).await.unwrap();
        assert_eq!(view.summary.dominant_category, Some(OrientationCategory::Left));
        assert_eq!(view.summary.per_category_counts.center, 2);
    }

    #[tokio::test]
    async fn test_concurrent_votes_keep_counts_consistent() {
        let f = fixture().await;
        let categories = ["left", "right", "center", "far_left", "far_right", "left"];
        let handles: Vec<_> = categories
            .iter()
            .map(|category| {
                let votes = f.votes.clone();
                let post = f.post.clone();
                let category = category.to_string();
                tokio::spawn(async move { votes.vote(&post, "a", &category).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let orientation = orientation(&f).await;
        assert_eq!(orientation.voters.len(), 1);
        assert_eq!(orientation.counts.total(), 1);
        assert_eq!(orientation.counts.get(orientation.voters[0].category), 1);
    }

    #[tokio::test]
    async fn test_first_vote_notifies_owner_once() {
        let f = fixture().await;
        f.votes.vote(&f.post, "a", "left").await.unwrap();
        f.votes.vote(&f.post, "a", "right").await.unwrap();
        f.votes.vote(&f.post, "owner", "right").await.unwrap();
        f.tasks.wait_idle().await;

        let notifications = f.store.all_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].notification_type, NotificationType::PostVote);
        assert_eq!(notifications[0].sender_id, "a");
    }

    #[tokio::test]
    async fn test_orientation_cached_for_anonymous_only() {
        let f = fixture().await;
        f.votes.vote(&f.post, "a", "left").await.unwrap();

        f.votes.orientation(&f.post, &Viewer::Anonymous).await.unwrap();
        assert_eq!(f.cache.stats().entries, 1);

        let mine = f
            .votes
            .orientation(&f.post, &Viewer::Actor("a".into()))
            .await
            .unwrap();
        assert_eq!(mine.my_vote, Some(OrientationCategory::Left));
        assert_eq!(f.cache.stats().entries, 1);

        // A vote flushes the cached aggregate
        f.votes.vote(&f.post, "b", "right").await.unwrap();
        assert_eq!(f.cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_vote_lost_to_contention_is_an_error() {
        let f = fixture().await;
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(LocalBroadcaster::new());
        let notifier = Notifier::new(f.store.clone(), f.store.clone(), broadcaster.clone(), f.tasks.clone());
        let votes = VoteAggregator::new(
            Arc::new(AlwaysContended { inner: f.store.clone() }),
            f.cache.clone(),
            broadcaster,
            notifier,
            f.tasks.clone(),
        );

        let err = votes.vote(&f.post, "a", "left").await.unwrap_err();
        assert!(matches!(err, EngineError::StoreUnavailable(_)));
        assert!(err.is_transient());
        f.tasks.wait_idle().await;
        assert!(f.store.all_notifications().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_category_touches_nothing() {
        let f = fixture().await;
        assert!(f.votes.vote(&f.post, "a", "upside_down").await.is_err());
        assert!(orientation(&f).await.voters.is_empty());
    }
}
