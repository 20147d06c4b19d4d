//! Engine facade
//!
//! Wires the stores, cache, broadcaster and task queue into the interaction
//! components once, and runs the standing and rate-limit pre-checks in front
//! of every mutation so a rejected request never reaches the store.

use std::sync::Arc;
use tracing::debug;

use crate::auth::{Action, ActorContext, RateLimiter};
use crate::cache::{NamespaceCache, Viewer};
use crate::db::schemas::{ContentKind, ContentRef, ReportDoc};
use crate::db::store::{Page, Stores};
use crate::interactions::{
    BookmarkMirror, ContentView, FeedPage, FeedReader, OrientationView, ToggleAction, ToggleEngine, ToggleOutcome,
    VoteAggregator, VoteOutcome,
};
use crate::logging::AuditLogger;
use crate::moderation::{AutoModerator, ModerationConfig, ReportIntake};
use crate::notify::{Inbox, Notifier};
use crate::realtime::Broadcaster;
use crate::tasks::TaskQueue;
use crate::types::Result;

pub struct Engine {
    broadcaster: Arc<dyn Broadcaster>,
    cache: Arc<NamespaceCache>,
    limiter: Arc<dyn RateLimiter>,
    tasks: TaskQueue,
    notifier: Notifier,
    toggles: ToggleEngine,
    votes: VoteAggregator,
    mirror: BookmarkMirror,
    feed: FeedReader,
    reports: ReportIntake,
    inbox: Inbox,
    moderator: Arc<AutoModerator>,
}

impl Engine {
    pub fn new(
        stores: Stores,
        broadcaster: Arc<dyn Broadcaster>,
        cache: Arc<NamespaceCache>,
        limiter: Arc<dyn RateLimiter>,
        audit: AuditLogger,
        moderation: ModerationConfig,
    ) -> Self {
        let tasks = TaskQueue::new();
        let notifier = Notifier::new(
            Arc::clone(&stores.actors),
            Arc::clone(&stores.notifications),
            Arc::clone(&broadcaster),
            tasks.clone(),
        );
        let mirror = BookmarkMirror::new(Arc::clone(&stores.content), Arc::clone(&stores.actors));
        let toggles = ToggleEngine::new(
            Arc::clone(&stores.content),
            mirror.clone(),
            Arc::clone(&cache),
            Arc::clone(&broadcaster),
            notifier.clone(),
            tasks.clone(),
        );
        let votes = VoteAggregator::new(
            Arc::clone(&stores.content),
            Arc::clone(&cache),
            Arc::clone(&broadcaster),
            notifier.clone(),
            tasks.clone(),
        );
        let feed = FeedReader::new(Arc::clone(&stores.content), Arc::clone(&cache));
        let reports = ReportIntake::new(Arc::clone(&stores.content), Arc::clone(&stores.reports));
        let inbox = Inbox::new(Arc::clone(&stores.notifications));
        let moderator = Arc::new(AutoModerator::new(
            Arc::clone(&stores.content),
            Arc::clone(&stores.reports),
            Arc::clone(&cache),
            notifier.clone(),
            audit,
            moderation,
        ));

        Self {
            broadcaster,
            cache,
            limiter,
            tasks,
            notifier,
            toggles,
            votes,
            mirror,
            feed,
            reports,
            inbox,
            moderator,
        }
    }

    async fn authorize(&self, ctx: &ActorContext, action: Action) -> Result<()> {
        ctx.ensure_can(action)?;
        self.limiter.check(&ctx.actor_id, action).await?;
        debug!(actor_id = %ctx.actor_id, action = %action, "Pre-checks passed");
        Ok(())
    }

    pub async fn toggle(&self, ctx: &ActorContext, action: ToggleAction, target: &ContentRef) -> Result<ToggleOutcome> {
        self.authorize(ctx, action.action()).await?;
        self.toggles.toggle(action, &ctx.actor_id, target).await
    }

    pub async fn toggle_like(&self, ctx: &ActorContext, target: &ContentRef) -> Result<ToggleOutcome> {
        self.toggle(ctx, ToggleAction::Like, target).await
    }

    pub async fn toggle_dislike(&self, ctx: &ActorContext, target: &ContentRef) -> Result<ToggleOutcome> {
        self.toggle(ctx, ToggleAction::Dislike, target).await
    }

    pub async fn toggle_bookmark(&self, ctx: &ActorContext, target: &ContentRef) -> Result<ToggleOutcome> {
        self.toggle(ctx, ToggleAction::Bookmark, target).await
    }

    pub async fn vote(&self, ctx: &ActorContext, target: &ContentRef, category: &str) -> Result<VoteOutcome> {
        self.authorize(ctx, Action::Vote).await?;
        self.votes.vote(target, &ctx.actor_id, category).await
    }

    pub async fn file_report(&self, ctx: &ActorContext, target: &ContentRef, reason: &str) -> Result<ReportDoc> {
        self.authorize(ctx, Action::Report).await?;
        self.reports.file_report(&ctx.actor_id, target, reason).await
    }

    pub async fn orientation(&self, target: &ContentRef, viewer: &Viewer) -> Result<OrientationView> {
        self.votes.orientation(target, viewer).await
    }

    pub async fn list(&self, kind: ContentKind, page: Page, viewer: &Viewer) -> Result<FeedPage> {
        self.feed.list(kind, page, viewer).await
    }

    pub async fn detail(&self, target: &ContentRef, viewer: &Viewer) -> Result<ContentView> {
        self.feed.detail(target, viewer).await
    }

    /// The actor's bookmarks, read from their mirror
    pub async fn my_bookmarks(&self, actor_id: &str, page: Page) -> Result<Vec<ContentView>> {
        let viewer = Viewer::Actor(actor_id.to_string());
        let docs = self.mirror.my_bookmarks(actor_id, page).await?;
        Ok(docs.iter().map(|doc| ContentView::render(doc, &viewer)).collect())
    }

    /// Compare an actor's bookmark mirror with the content side
    pub async fn diagnose_mirror(&self, actor_id: &str) -> Result<()> {
        self.mirror.diagnose(actor_id).await
    }

    /// Subscribe a real-time connection to a content channel
    pub async fn join_content_channel(&self, connection_id: &str, target: &ContentRef) -> Result<()> {
        self.broadcaster.join_channel(connection_id, &target.channel()).await
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn moderator(&self) -> Arc<AutoModerator> {
        Arc::clone(&self.moderator)
    }

    pub fn cache(&self) -> &Arc<NamespaceCache> {
        &self.cache
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    /// Stop the scheduler and let detached work drain
    pub async fn shutdown(&self) {
        self.moderator.stop().await;
        self.tasks.wait_idle().await;
    }
}
