//! Feed and detail reads
//!
//! Anonymous pages are served through the namespace cache; any write to a
//! content kind flushes that kind's namespace. Authenticated reads skip the
//! cache and carry the viewer's own like/dislike/bookmark/vote state.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::vote::VoteOutcome;
use crate::cache::{content_namespace, CacheKey, NamespaceCache, Viewer};
use crate::db::schemas::{ContentDoc, ContentKind, ContentRef, InteractionKind, OrientationCategory};
use crate::db::store::{ContentStore, Page};
use crate::types::{EngineError, Result};

/// Public counters of one content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionCounts {
    pub likes: i64,
    pub dislikes: i64,
    pub bookmarks: i64,
    pub comments: i64,
}

/// What the viewer has done to this content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerState {
    pub liked: bool,
    pub disliked: bool,
    pub bookmarked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<OrientationCategory>,
}

/// Rendered content; member sets and voter lists are never exposed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentView {
    pub id: String,
    pub kind: ContentKind,
    pub owner_id: String,
    pub title: String,
    pub body: String,
    pub counts: InteractionCounts,
    pub orientation: VoteOutcome,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ViewerState>,
}

impl ContentView {
    pub fn render(content: &ContentDoc, viewer: &Viewer) -> Self {
        let interactions = &content.interactions;
        let viewer = viewer.actor_id().map(|actor_id| ViewerState {
            liked: interactions.get(InteractionKind::Likes).contains(actor_id),
            disliked: interactions.get(InteractionKind::Dislikes).contains(actor_id),
            bookmarked: interactions.get(InteractionKind::Bookmarks).contains(actor_id),
            vote: content.political_orientation.vote_of(actor_id).map(|v| v.category),
        });

        Self {
            id: content.id.clone(),
            kind: content.kind,
            owner_id: content.owner_id.clone(),
            title: content.title.clone(),
            body: content.body.clone(),
            counts: InteractionCounts {
                likes: interactions.likes.count,
                dislikes: interactions.dislikes.count,
                bookmarks: interactions.bookmarks.count,
                comments: interactions.comments.count,
            },
            orientation: VoteOutcome::from(&content.political_orientation),
            created_at: content
                .metadata
                .created_at
                .and_then(|at| at.try_to_rfc3339_string().ok())
                .unwrap_or_default(),
            viewer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPage {
    pub items: Vec<ContentView>,
    /// Live content of this kind
    pub total: u64,
}

#[derive(Clone)]
pub struct FeedReader {
    content: Arc<dyn ContentStore>,
    cache: Arc<NamespaceCache>,
}

impl FeedReader {
    pub fn new(content: Arc<dyn ContentStore>, cache: Arc<NamespaceCache>) -> Self {
        Self { content, cache }
    }

    /// Live content of one kind, newest first
    pub async fn list(&self, kind: ContentKind, page: Page, viewer: &Viewer) -> Result<FeedPage> {
        let key = CacheKey::new(
            &content_namespace(kind),
            &format!("list:skip={}:limit={}", page.skip, page.limit),
        );
        self.cache
            .read_through(viewer, &key, || async {
                let docs = self.content.list_live(kind, page).await?;
                let total = self.content.count_live(kind).await?;
                Ok(FeedPage {
                    items: docs.iter().map(|doc| ContentView::render(doc, viewer)).collect(),
                    total,
                })
            })
            .await
    }

    /// One live content; removed content is `NotFound`
    pub async fn detail(&self, target: &ContentRef, viewer: &Viewer) -> Result<ContentView> {
        let key = CacheKey::new(&content_namespace(target.kind), &format!("detail:{}", target.id));
        self.cache
            .read_through(viewer, &key, || async {
                match self.content.find_content(target).await? {
                    Some(doc) if doc.is_live() => Ok(ContentView::render(&doc, viewer)),
                    _ => Err(EngineError::NotFound(format!("content {target}"))),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::InteractionUser;
    use crate::db::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, Arc<NamespaceCache>, FeedReader, Vec<ContentRef>) {
        let store = Arc::new(MemoryStore::new());
        let mut refs = Vec::new();
        for title in ["first", "second", "third"] {
            let content = ContentDoc::new(ContentKind::Post, "owner", title, "");
            refs.push(content.content_ref());
            store.insert_content(content).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        let cache = Arc::new(NamespaceCache::with_defaults());
        let feed = FeedReader::new(store.clone(), cache.clone());
        (store, cache, feed, refs)
    }

    #[tokio::test]
    async fn test_list_newest_first_with_total() {
        let (_store, _cache, feed, _refs) = setup().await;
        let page = feed.list(ContentKind::Post, Page::new(1, 2), &Viewer::Anonymous).await.unwrap();
        assert_eq!(page.total, 3);
        let titles: Vec<&str> = page.items.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, vec!["third", "second"]);
        assert!(page.items[0].viewer.is_none());
    }

    #[tokio::test]
    async fn test_anonymous_list_is_cached_until_invalidated() {
        let (store, cache, feed, refs) = setup().await;
        feed.list(ContentKind::Post, Page::default(), &Viewer::Anonymous).await.unwrap();

        store
            .add_member(&refs[0], InteractionKind::Likes, InteractionUser::now("alice"))
            .await
            .unwrap();

        // Stale until the namespace is flushed
        let stale = feed.list(ContentKind::Post, Page::default(), &Viewer::Anonymous).await.unwrap();
        let first = stale.items.iter().find(|v| v.id == refs[0].id).unwrap();
        assert_eq!(first.counts.likes, 0);

        cache.invalidate_namespace(&content_namespace(ContentKind::Post));
        let fresh = feed.list(ContentKind::Post, Page::default(), &Viewer::Anonymous).await.unwrap();
        let first = fresh.items.iter().find(|v| v.id == refs[0].id).unwrap();
        assert_eq!(first.counts.likes, 1);
    }

    #[tokio::test]
    async fn test_authenticated_detail_bypasses_cache() {
        let (store, cache, feed, refs) = setup().await;
        store
            .add_member(&refs[1], InteractionKind::Bookmarks, InteractionUser::now("alice"))
            .await
            .unwrap();

        let view = feed.detail(&refs[1], &Viewer::Actor("alice".into())).await.unwrap();
        let state = view.viewer.unwrap();
        assert!(state.bookmarked);
        assert!(!state.liked);
        assert_eq!(cache.stats().entries, 0);

        feed.detail(&refs[1], &Viewer::Anonymous).await.unwrap();
        assert_eq!(cache.stats().entries, 1);
    }

    #[tokio::test]
    async fn test_removed_content_is_not_found() {
        let (store, _cache, feed, refs) = setup().await;
        store.soft_delete(&refs[2], bson::DateTime::now()).await.unwrap();

        assert!(matches!(
            feed.detail(&refs[2], &Viewer::Anonymous).await,
            Err(EngineError::NotFound(_))
        ));
        let page = feed.list(ContentKind::Post, Page::default(), &Viewer::Anonymous).await.unwrap();
        assert_eq!(page.total, 2);
    }
}
