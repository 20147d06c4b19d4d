//! Like / dislike / bookmark toggles
//!
//! A toggle reads membership (advisory only), then issues one guarded atomic
//! update: add-and-increment when absent, remove-and-decrement when present.
//! The guard makes a duplicate or racing toggle a no-op instead of a double
//! count; after a no-op the engine re-reads and reports the converged state.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::mirror::BookmarkMirror;
use crate::auth::Action;
use crate::cache::{content_namespace, NamespaceCache};
use crate::db::schemas::{ContentDoc, ContentRef, InteractionKind, InteractionUser, NotificationType};
use crate::db::store::ContentStore;
use crate::notify::{NotificationEvent, Notifier};
use crate::realtime::{publish_detached, Broadcaster, EVENT_INTERACTION_UPDATED};
use crate::tasks::TaskQueue;
use crate::types::{EngineError, Result};

/// User-facing toggle actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleAction {
    Like,
    Dislike,
    Bookmark,
}

impl ToggleAction {
    pub fn interaction_kind(self) -> InteractionKind {
        match self {
            ToggleAction::Like => InteractionKind::Likes,
            ToggleAction::Dislike => InteractionKind::Dislikes,
            ToggleAction::Bookmark => InteractionKind::Bookmarks,
        }
    }

    /// The state this action excludes
    pub fn opposite(self) -> Option<InteractionKind> {
        match self {
            ToggleAction::Like => Some(InteractionKind::Dislikes),
            ToggleAction::Dislike => Some(InteractionKind::Likes),
            ToggleAction::Bookmark => None,
        }
    }

    /// Notification sent to the owner on activation
    pub fn notification(self) -> Option<NotificationType> {
        match self {
            ToggleAction::Like => Some(NotificationType::PostLike),
            ToggleAction::Bookmark => Some(NotificationType::PostBookmark),
            ToggleAction::Dislike => None,
        }
    }

    /// Action gated by the standing and rate-limit checks
    pub fn action(self) -> Action {
        match self {
            ToggleAction::Like => Action::Like,
            ToggleAction::Dislike => Action::Dislike,
            ToggleAction::Bookmark => Action::Bookmark,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToggleAction::Like => "like",
            ToggleAction::Dislike => "dislike",
            ToggleAction::Bookmark => "bookmark",
        }
    }
}

impl fmt::Display for ToggleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToggleAction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "like" => Ok(ToggleAction::Like),
            "dislike" => Ok(ToggleAction::Dislike),
            "bookmark" | "save" => Ok(ToggleAction::Bookmark),
            other => Err(EngineError::InvalidState(format!("unknown toggle action '{other}'"))),
        }
    }
}

/// Result of a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    /// Whether the actor holds the state after the call
    pub is_active: bool,
    pub new_count: i64,
}

impl ToggleOutcome {
    fn of(content: &ContentDoc, kind: InteractionKind, actor_id: &str) -> Self {
        let set = content.interactions.get(kind);
        Self {
            is_active: set.contains(actor_id),
            new_count: set.count,
        }
    }
}

/// Toggle state machine over the content store
#[derive(Clone)]
pub struct ToggleEngine {
    content: Arc<dyn ContentStore>,
    mirror: BookmarkMirror,
    cache: Arc<NamespaceCache>,
    broadcaster: Arc<dyn Broadcaster>,
    notifier: Notifier,
    tasks: TaskQueue,
}

impl ToggleEngine {
    pub fn new(
        content: Arc<dyn ContentStore>,
        mirror: BookmarkMirror,
        cache: Arc<NamespaceCache>,
        broadcaster: Arc<dyn Broadcaster>,
        notifier: Notifier,
        tasks: TaskQueue,
    ) -> Self {
        Self {
            content,
            mirror,
            cache,
            broadcaster,
            notifier,
            tasks,
        }
    }

    pub async fn toggle(&self, action: ToggleAction, actor_id: &str, target: &ContentRef) -> Result<ToggleOutcome> {
        let current = self.load_live(target).await?;
        let kind = action.interaction_kind();
        let was_member = current.interactions.get(kind).contains(actor_id);

        // Kinds whose count changed, for the broadcast
        let mut changed: Vec<InteractionKind> = Vec::with_capacity(2);

        let written = if was_member {
            self.content.remove_member(target, kind, actor_id).await?
        } else {
            let mut cleared = None;
            if let Some(opposite) = action.opposite() {
                if current.interactions.get(opposite).contains(actor_id) {
                    cleared = self.content.remove_member(target, opposite, actor_id).await?;
                    if cleared.is_some() {
                        changed.push(opposite);
                    }
                }
            }
            match self
                .content
                .add_member(target, kind, InteractionUser::now(actor_id))
                .await
            {
                Ok(written) => written,
                Err(e) => {
                    // The opposite removal is already committed
                    if let Some(doc) = cleared {
                        warn!(
                            content = %target,
                            actor_id,
                            action = %action,
                            error = %e,
                            "Toggle failed after clearing the opposite reaction"
                        );
                        self.publish_changes(target, &doc, &changed);
                    }
                    return Err(e);
                }
            }
        };

        let transitioned = written.is_some();
        let latest = match written {
            Some(doc) => {
                changed.push(kind);
                doc
            }
            None => {
                debug!(content = %target, actor_id, action = %action, "Toggle lost a race, re-reading");
                self.load_live(target).await?
            }
        };
        let outcome = ToggleOutcome::of(&latest, kind, actor_id);

        if action == ToggleAction::Bookmark {
            self.mirror.sync(actor_id, &target.id, outcome.is_active).await;
        }

        self.publish_changes(target, &latest, &changed);

        if transitioned && outcome.is_active {
            self.announce(action, actor_id, &latest);
        }

        info!(
            content = %target,
            actor_id,
            action = %action,
            is_active = outcome.is_active,
            count = outcome.new_count,
            "Toggle applied"
        );
        Ok(outcome)
    }

    /// Owner notification on activation; never for the owner's own action
    /// Flush cached listings and broadcast the new count of every changed kind
    fn publish_changes(&self, target: &ContentRef, doc: &ContentDoc, changed: &[InteractionKind]) {
        if changed.is_empty() {
            return;
        }
        self.cache.invalidate_namespace(&content_namespace(target.kind));
        for changed_kind in changed {
            let set = doc.interactions.get(*changed_kind);
            publish_detached(
                &self.tasks,
                &self.broadcaster,
                target.channel(),
                EVENT_INTERACTION_UPDATED,
                json!({
                    "content": target,
                    "kind": changed_kind,
                    "count": set.count,
                }),
            );
        }
    }

    fn announce(&self, action: ToggleAction, actor_id: &str, content: &ContentDoc) {
        let Some(notification_type) = action.notification() else {
            return;
        };
        if content.owner_id == actor_id {
            return;
        }
        self.notifier.dispatch(
            NotificationEvent::new(notification_type, &content.owner_id, actor_id)
                .with_content(content.content_ref()),
        );
    }

    async fn load_live(&self, target: &ContentRef) -> Result<ContentDoc> {
        match self.content.find_content(target).await? {
            Some(content) if content.is_live() => Ok(content),
            _ => Err(EngineError::NotFound(format!("content {target}"))),
        }
    }
}
