//! Bookmark mirror
//!
//! A content's `interactions.bookmarks.users` is the source of truth; the
//! actor's `bookmarks` (and legacy `saved_posts`) list mirrors it so "my
//! bookmarks" is a point read. The two sides are separate documents with no
//! transaction between them: the content side is written first, the actor
//! side second, and a failed actor write is logged and left for the
//! diagnostic to find. Both writes are set operations, so re-applying the
//! final state heals a lost write.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::schemas::{ContentDoc, InteractionKind};
use crate::db::store::{ActorStore, ContentStore, Page};
use crate::types::{EngineError, Result};

#[derive(Clone)]
pub struct BookmarkMirror {
    content: Arc<dyn ContentStore>,
    actors: Arc<dyn ActorStore>,
}

impl BookmarkMirror {
    pub fn new(content: Arc<dyn ContentStore>, actors: Arc<dyn ActorStore>) -> Self {
        Self { content, actors }
    }

    /// Write the actor side for the given final state
    pub async fn apply(&self, actor_id: &str, content_id: &str, bookmarked: bool) -> Result<bool> {
        if bookmarked {
            self.actors.add_bookmark(actor_id, content_id).await
        } else {
            self.actors.remove_bookmark(actor_id, content_id).await
        }
    }

    /// Best-effort [`apply`](Self::apply): failures are logged, never returned
    pub async fn sync(&self, actor_id: &str, content_id: &str, bookmarked: bool) {
        match self.apply(actor_id, content_id, bookmarked).await {
            Ok(true) => debug!(actor_id, content_id, bookmarked, "Bookmark mirror updated"),
            Ok(false) => warn!(actor_id, content_id, "Bookmark mirror skipped: actor not found"),
            Err(e) => warn!(
                actor_id,
                content_id,
                bookmarked,
                error = %e,
                "Bookmark mirror write failed, actor list diverges until repaired"
            ),
        }
    }

    /// Live bookmarked content, most recently bookmarked first
    pub async fn my_bookmarks(&self, actor_id: &str, page: Page) -> Result<Vec<ContentDoc>> {
        let actor = self
            .actors
            .find_actor(actor_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("actor {actor_id}")))?;

        let ids: Vec<String> = actor
            .bookmarks
            .iter()
            .rev()
            .skip(page.skip as usize)
            .take(page.limit.max(0) as usize)
            .cloned()
            .collect();

        let mut found = self.content.find_contents(&ids).await?;
        found.sort_by_key(|c| ids.iter().position(|id| *id == c.id));
        Ok(found)
    }

    /// Compare the actor's mirror with the content-side source of truth.
    ///
    /// Returns `InconsistentMirror` listing both directions of divergence.
    pub async fn diagnose(&self, actor_id: &str) -> Result<()> {
        let actor = self
            .actors
            .find_actor(actor_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("actor {actor_id}")))?;

        let on_content: BTreeSet<String> = self
            .content
            .contents_with_member(InteractionKind::Bookmarks, actor_id)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let on_actor: BTreeSet<String> = actor.bookmarks.iter().cloned().collect();

        let missing_on_actor: Vec<String> = on_content.difference(&on_actor).cloned().collect();
        let missing_on_content: Vec<String> = on_actor.difference(&on_content).cloned().collect();

        if missing_on_actor.is_empty() && missing_on_content.is_empty() {
            debug!(actor_id, bookmarks = on_actor.len(), "Bookmark mirror consistent");
            return Ok(());
        }

        warn!(
            actor_id,
            missing_on_actor = missing_on_actor.len(),
            missing_on_content = missing_on_content.len(),
            "Bookmark mirror inconsistent"
        );
        Err(EngineError::InconsistentMirror {
            actor_id: actor_id.to_string(),
            missing_on_actor,
            missing_on_content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{ActorDoc, ContentKind, InteractionUser};
    use crate::db::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, BookmarkMirror, Vec<ContentDoc>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_actor(ActorDoc::new("alice", "alice")).await.unwrap();
        let mut contents = Vec::new();
        for title in ["one", "two", "three"] {
            let content = ContentDoc::new(ContentKind::Post, "owner", title, "");
            store.insert_content(content.clone()).await.unwrap();
            contents.push(content);
        }
        let mirror = BookmarkMirror::new(store.clone(), store.clone());
        (store, mirror, contents)
    }

    async fn bookmark_both_sides(store: &MemoryStore, mirror: &BookmarkMirror, content: &ContentDoc) {
        store
            .add_member(&content.content_ref(), InteractionKind::Bookmarks, InteractionUser::now("alice"))
            .await
            .unwrap();
        mirror.sync("alice", &content.id, true).await;
    }

    #[tokio::test]
    async fn test_apply_writes_both_lists() {
        let (store, mirror, contents) = setup().await;

        assert!(mirror.apply("alice", &contents[0].id, true).await.unwrap());
        assert!(mirror.apply("alice", &contents[0].id, true).await.unwrap());
        let actor = store.find_actor("alice").await.unwrap().unwrap();
        assert_eq!(actor.bookmarks, vec![contents[0].id.clone()]);
        assert_eq!(actor.saved_posts, actor.bookmarks);

        mirror.apply("alice", &contents[0].id, false).await.unwrap();
        let actor = store.find_actor("alice").await.unwrap().unwrap();
        assert!(actor.bookmarks.is_empty());
        assert!(actor.saved_posts.is_empty());
    }

    #[tokio::test]
    async fn test_my_bookmarks_newest_first() {
        let (store, mirror, contents) = setup().await;
        for content in &contents {
            bookmark_both_sides(&store, &mirror, content).await;
        }

        let page = mirror.my_bookmarks("alice", Page::default()).await.unwrap();
        let titles: Vec<&str> = page.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["three", "two", "one"]);

        let second = mirror.my_bookmarks("alice", Page::new(2, 2)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].title, "one");
    }

    #[tokio::test]
    async fn test_diagnose_consistent() {
        let (store, mirror, contents) = setup().await;
        bookmark_both_sides(&store, &mirror, &contents[0]).await;
        tokio_test::assert_ok!(mirror.diagnose("alice").await);
    }

    #[tokio::test]
    async fn test_diagnose_reports_both_directions() {
        let (store, mirror, contents) = setup().await;

        // Content side written, actor side lost
        store.fail_actor_writes(true);
        bookmark_both_sides(&store, &mirror, &contents[0]).await;
        store.fail_actor_writes(false);

        // Actor side only
        mirror.apply("alice", &contents[1].id, true).await.unwrap();

        match mirror.diagnose("alice").await {
            Err(EngineError::InconsistentMirror {
                actor_id,
                missing_on_actor,
                missing_on_content,
            }) => {
                assert_eq!(actor_id, "alice");
                assert_eq!(missing_on_actor, vec![contents[0].id.clone()]);
                assert_eq!(missing_on_content, vec![contents[1].id.clone()]);
            }
            other => panic!("expected InconsistentMirror, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reapplying_final_state_heals() {
        let (store, mirror, contents) = setup().await;
        store.fail_actor_writes(true);
        bookmark_both_sides(&store, &mirror, &contents[2]).await;
        store.fail_actor_writes(false);
        assert!(mirror.diagnose("alice").await.is_err());

        mirror.sync("alice", &contents[2].id, true).await;
        assert!(mirror.diagnose("alice").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_actor() {
        let (_store, mirror, _contents) = setup().await;
        assert!(matches!(mirror.diagnose("ghost").await, Err(EngineError::NotFound(_))));
    }
}
