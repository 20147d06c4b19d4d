//! Auto-moderation scheduler
//!
//! On a fixed interval, groups pending reports by target, scores each group
//! and soft-deletes targets at or above the threshold. A target moves
//! `clean -> under_review -> removed`; removal is terminal and guarded by the
//! store, so two overlapping evaluations cannot remove the same target twice.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::scoring::{ReportScoring, ScoringKind};
use crate::cache::{content_namespace, NamespaceCache};
use crate::db::schemas::{ContentRef, NotificationType, ReportAggregate, ReportStatus};
use crate::db::store::{ContentStore, ReportStore};
use crate::logging::{AuditEventType, AuditLogger};
use crate::notify::{NotificationEvent, Notifier};
use crate::types::{EngineError, Result};

/// Recorded as `reviewed_by` on reports the scheduler acts on
pub const MODERATOR_ID: &str = "auto-moderation";
/// Sender of removal notifications
pub const SYSTEM_SENDER: &str = "system";

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Score at or above which a target is removed
    pub threshold: f64,
    pub scoring: ScoringKind,
    pub report_weight: f64,
    pub reporter_weight: f64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(300),
            threshold: 5.0,
            scoring: ScoringKind::DistinctReporters,
            report_weight: 0.5,
            reporter_weight: 1.0,
        }
    }
}

impl ModerationConfig {
    pub fn from_args(args: &crate::config::Args) -> Self {
        let scoring = args.moderation_scoring.parse::<ScoringKind>().unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to distinct_reporters scoring");
            ScoringKind::default()
        });
        Self {
            enabled: args.moderation_enabled,
            interval: Duration::from_secs(args.moderation_interval_secs),
            threshold: args.moderation_threshold,
            scoring,
            report_weight: args.report_weight,
            reporter_weight: args.reporter_weight,
        }
    }
}

/// Moderation state of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Clean,
    UnderReview,
    Removed,
}

/// Outcome of one scan
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Targets with pending reports
    pub scanned: usize,
    pub removed: Vec<ContentRef>,
    pub below_threshold: usize,
    /// Already removed or missing
    pub skipped: usize,
    pub failed: usize,
}

enum Verdict {
    Removed,
    BelowThreshold,
    Skipped,
}

pub struct AutoModerator {
    content: Arc<dyn ContentStore>,
    reports: Arc<dyn ReportStore>,
    cache: Arc<NamespaceCache>,
    notifier: Notifier,
    audit: AuditLogger,
    scoring: Arc<dyn ReportScoring>,
    config: ModerationConfig,
    /// Held for the duration of a scan
    scan_lock: Mutex<()>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl AutoModerator {
    pub fn new(
        content: Arc<dyn ContentStore>,
        reports: Arc<dyn ReportStore>,
        cache: Arc<NamespaceCache>,
        notifier: Notifier,
        audit: AuditLogger,
        config: ModerationConfig,
    ) -> Self {
        let scoring = config.scoring.build(config.report_weight, config.reporter_weight);
        Self {
            content,
            reports,
            cache,
            notifier,
            audit,
            scoring,
            config,
            scan_lock: Mutex::new(()),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Replace the scoring strategy
    pub fn with_scoring(mut self, scoring: Arc<dyn ReportScoring>) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    /// Spawn the interval loop. The first scan runs one interval after start.
    pub async fn start(self: Arc<Self>) -> Result<JoinHandle<()>> {
        let mut shutdown = self.shutdown_tx.lock().await;
        if shutdown.is_some() {
            return Err(EngineError::InvalidState("auto-moderation already started".into()));
        }
        let (tx, mut rx) = mpsc::channel::<()>(1);
        *shutdown = Some(tx);
        drop(shutdown);

        info!(
            interval_secs = self.config.interval.as_secs(),
            threshold = self.config.threshold,
            strategy = self.scoring.name(),
            "Starting auto-moderation scheduler"
        );

        let moderator = Arc::clone(&self);
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(moderator.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match moderator.run_once(None).await {
                            Ok(summary) => debug!(
                                scanned = summary.scanned,
                                removed = summary.removed.len(),
                                failed = summary.failed,
                                "Scheduled moderation scan finished"
                            ),
                            Err(EngineError::InvalidState(msg)) => debug!("Skipping tick: {}", msg),
                            Err(e) => error!(error = %e, "Scheduled moderation scan failed"),
                        }
                    }
                    _ = rx.recv() => {
                        info!("Auto-moderation scheduler stopped");
                        break;
                    }
                }
            }
        }))
    }

    /// Signal the interval loop to exit; a scan in progress completes first
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(()).await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.shutdown_tx.lock().await.is_some()
    }

    /// Scan every target with pending reports, or only `target`.
    ///
    /// Fails with `InvalidState` when another scan holds the lock.
    pub async fn run_once(&self, target: Option<&ContentRef>) -> Result<RunSummary> {
        let _scan = self
            .scan_lock
            .try_lock()
            .map_err(|_| EngineError::InvalidState("auto-moderation scan already running".into()))?;

        let aggregates = self.reports.pending_aggregates(target).await?;
        let mut summary = RunSummary {
            scanned: aggregates.len(),
            ..Default::default()
        };

        for aggregate in &aggregates {
            match self.evaluate(aggregate).await {
                Ok(Verdict::Removed) => summary.removed.push(aggregate.target.clone()),
                Ok(Verdict::BelowThreshold) => summary.below_threshold += 1,
                Ok(Verdict::Skipped) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(content = %aggregate.target, error = %e, "Moderation of target failed");
                    let event = self
                        .audit
                        .event(AuditEventType::RemovalFailed)
                        .with_target(aggregate.target.clone())
                        .with_metadata(serde_json::json!({ "error": e.to_string() }));
                    self.audit.log(event).await;
                }
            }
        }

        if !summary.removed.is_empty() || summary.failed > 0 {
            let event = self
                .audit
                .event(AuditEventType::ScanCompleted)
                .with_metadata(serde_json::json!({
                    "scanned": summary.scanned,
                    "removed": summary.removed.len(),
                    "failed": summary.failed,
                }));
            self.audit.log(event).await;
        }

        info!(
            scanned = summary.scanned,
            removed = summary.removed.len(),
            below_threshold = summary.below_threshold,
            skipped = summary.skipped,
            failed = summary.failed,
            "Moderation scan complete"
        );
        Ok(summary)
    }

    /// Current state of `target`
    pub async fn state(&self, target: &ContentRef) -> Result<TargetState> {
        let content = self
            .content
            .find_content(target)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("content {target}")))?;
        if !content.is_live() {
            return Ok(TargetState::Removed);
        }
        let pending = self.reports.pending_aggregates(Some(target)).await?;
        Ok(if pending.is_empty() {
            TargetState::Clean
        } else {
            TargetState::UnderReview
        })
    }

    async fn evaluate(&self, aggregate: &ReportAggregate) -> Result<Verdict> {
        let target = &aggregate.target;
        let score = self.scoring.score(aggregate);
        if score < self.config.threshold {
            debug!(content = %target, score, threshold = self.config.threshold, "Below threshold");
            return Ok(Verdict::BelowThreshold);
        }

        let Some(content) = self.content.find_content(target).await? else {
            debug!(content = %target, "Reported content no longer exists");
            return Ok(Verdict::Skipped);
        };
        if !content.is_live() {
            // An earlier removal may have failed to resolve its reports
            let resolved = self
                .reports
                .resolve_reports(target, ReportStatus::ActionTaken, MODERATOR_ID, bson::DateTime::now())
                .await?;
            if resolved > 0 {
                info!(content = %target, reports_resolved = resolved, "Resolved reports of removed content");
            }
            return Ok(Verdict::Skipped);
        }

        let now = bson::DateTime::now();
        if !self.content.soft_delete(target, now).await? {
            debug!(content = %target, "Content removed concurrently");
            return Ok(Verdict::Skipped);
        }

        let resolved = match self
            .reports
            .resolve_reports(target, ReportStatus::ActionTaken, MODERATOR_ID, now)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(content = %target, error = %e, "Content removed but reports left unresolved");
                0
            }
        };

        self.cache.invalidate_namespace(&content_namespace(target.kind));

        self.notifier.dispatch(
            NotificationEvent::new(NotificationType::PostRemoved, &content.owner_id, SYSTEM_SENDER)
                .with_event_id(format!("removed:{}:{}", target.kind, target.id))
                .with_content(target.clone()),
        );

        let event = self
            .audit
            .event(AuditEventType::ContentRemoved)
            .with_target(target.clone())
            .with_score(score, self.config.threshold, self.scoring.name())
            .with_reports_resolved(resolved);
        self.audit.log(event).await;

        info!(
            content = %target,
            owner_id = %content.owner_id,
            score,
            reports_resolved = resolved,
            "Content removed by auto-moderation"
        );
        Ok(Verdict::Removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, Viewer};
    use crate::db::schemas::{ActorDoc, ContentDoc, ContentKind, ReportDoc};
    use crate::db::store::ActorStore;
    use crate::db::MemoryStore;
    use crate::moderation::scoring::WeightedScoring;
    use crate::realtime::{Broadcaster, LocalBroadcaster};
    use crate::tasks::TaskQueue;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Report store whose first resolve call fails
    struct FlakyResolve {
        inner: Arc<MemoryStore>,
        failed: AtomicBool,
    }

    #[async_trait]
    impl ReportStore for FlakyResolve {
        async fn insert_report(&self, report: ReportDoc) -> Result<()> {
            self.inner.insert_report(report).await
        }

        async fn pending_aggregates(&self, target: Option<&ContentRef>) -> Result<Vec<ReportAggregate>> {
            self.inner.pending_aggregates(target).await
        }

        async fn resolve_reports(
            &self,
            target: &ContentRef,
            status: ReportStatus,
            reviewed_by: &str,
            at: bson::DateTime,
        ) -> Result<u64> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(EngineError::StoreUnavailable("reports offline".into()));
            }
            self.inner.resolve_reports(target, status, reviewed_by, at).await
        }

        async fn reports_for(&self, target: &ContentRef) -> Result<Vec<ReportDoc>> {
            self.inner.reports_for(target).await
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<NamespaceCache>,
        tasks: TaskQueue,
        moderator: Arc<AutoModerator>,
    }

    fn fixture_with(config: ModerationConfig) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(NamespaceCache::with_defaults());
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(LocalBroadcaster::new());
        let tasks = TaskQueue::new();
        let notifier = Notifier::new(store.clone(), store.clone(), broadcaster, tasks.clone());
        let moderator = Arc::new(AutoModerator::new(
            store.clone(),
            store.clone(),
            cache.clone(),
            notifier,
            AuditLogger::new("test-node".into()),
            config,
        ));
        Fixture {
            store,
            cache,
            tasks,
            moderator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ModerationConfig::default())
    }

    async fn content(f: &Fixture, owner: &str) -> ContentRef {
        let _ = f.store.insert_actor(ActorDoc::new(owner, owner)).await;
        let doc = ContentDoc::new(ContentKind::Post, owner, "reported", "");
        let target = doc.content_ref();
        f.store.insert_content(doc).await.unwrap();
        target
    }

    async fn report(f: &Fixture, target: &ContentRef, reporters: &[&str]) {
        for reporter in reporters {
            f.store
                .insert_report(ReportDoc::new(target, reporter, "abuse"))
                .await
                .unwrap();
        }
    }

    async fn statuses(f: &Fixture, target: &ContentRef) -> Vec<ReportStatus> {
        f.store
            .reports_for(target)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.status)
            .collect()
    }

    #[tokio::test]
    async fn test_threshold_crossing_removes_once() {
        let f = fixture();
        let target = content(&f, "owner").await;
        report(&f, &target, &["r1", "r2", "r3", "r4", "r5"]).await;

        let summary = f.moderator.run_once(None).await.unwrap();
        assert_eq!(summary.removed, vec![target.clone()]);
        f.tasks.wait_idle().await;

        let doc = f.store.find_content(&target).await.unwrap().unwrap();
        assert!(!doc.is_live());
        assert_eq!(statuses(&f, &target).await, vec![ReportStatus::ActionTaken; 5]);
        for r in f.store.reports_for(&target).await.unwrap() {
            assert_eq!(r.reviewed_by.as_deref(), Some(MODERATOR_ID));
            assert!(r.reviewed_at.is_some());
        }

        let notifications = f.store.all_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].notification_type, NotificationType::PostRemoved);
        assert_eq!(notifications[0].recipient_id, "owner");
        assert_eq!(f.moderator.state(&target).await.unwrap(), TargetState::Removed);

        // A late report is stored and changes nothing
        report(&f, &target, &["r6"]).await;
        let summary = f.moderator.run_once(None).await.unwrap();
        f.tasks.wait_idle().await;
        assert!(summary.removed.is_empty());
        assert_eq!(summary.below_threshold, 1);
        assert_eq!(f.store.all_notifications().len(), 1);
        assert_eq!(
            statuses(&f, &target).await.iter().filter(|s| **s == ReportStatus::Pending).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_below_threshold_leaves_target_alone() {
        let f = fixture();
        let target = content(&f, "owner").await;
        // Repeat reports from one actor count once
        report(&f, &target, &["r1", "r1", "r1", "r2", "r3", "r4"]).await;

        let summary = f.moderator.run_once(None).await.unwrap();
        assert_eq!(summary.below_threshold, 1);
        assert!(f.store.find_content(&target).await.unwrap().unwrap().is_live());
        assert!(statuses(&f, &target).await.iter().all(|s| *s == ReportStatus::Pending));
        assert_eq!(f.moderator.state(&target).await.unwrap(), TargetState::UnderReview);
    }

    #[tokio::test]
    async fn test_weighted_strategy_counts_repeats() {
        let f = fixture_with(ModerationConfig {
            scoring: ScoringKind::Weighted,
            ..Default::default()
        });
        let target = content(&f, "owner").await;
        // 0.5 * 4 + 1.0 * 3 = 5
        report(&f, &target, &["r1", "r1", "r2", "r3"]).await;

        let summary = f.moderator.run_once(None).await.unwrap();
        assert_eq!(summary.removed.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_target() {
        let f = fixture();
        let broken = content(&f, "owner").await;
        let healthy = content(&f, "owner").await;
        let reporters = ["r1", "r2", "r3", "r4", "r5"];
        report(&f, &broken, &reporters).await;
        report(&f, &healthy, &reporters).await;
        f.store.fail_content(&broken.id);

        let summary = f.moderator.run_once(None).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.removed, vec![healthy.clone()]);
        assert!(statuses(&f, &broken).await.iter().all(|s| *s == ReportStatus::Pending));
        assert_eq!(f.moderator.state(&broken).await.unwrap(), TargetState::UnderReview);
    }

    #[tokio::test]
    async fn test_unresolved_reports_heal_on_next_run() {
        let store = Arc::new(MemoryStore::new());
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(LocalBroadcaster::new());
        let tasks = TaskQueue::new();
        let notifier = Notifier::new(store.clone(), store.clone(), broadcaster, tasks.clone());
        let reports = Arc::new(FlakyResolve {
            inner: store.clone(),
            failed: AtomicBool::new(false),
        });
        let moderator = AutoModerator::new(
            store.clone(),
            reports,
            Arc::new(NamespaceCache::with_defaults()),
            notifier,
            AuditLogger::new("test-node".into()),
            ModerationConfig::default(),
        );

        let doc = ContentDoc::new(ContentKind::Post, "owner", "reported", "");
        let target = doc.content_ref();
        store.insert_content(doc).await.unwrap();
        for reporter in ["r1", "r2", "r3", "r4", "r5"] {
            store.insert_report(ReportDoc::new(&target, reporter, "abuse")).await.unwrap();
        }

        let first = moderator.run_once(None).await.unwrap();
        assert_eq!(first.removed, vec![target.clone()]);
        let pending = store.reports_for(&target).await.unwrap();
        assert!(pending.iter().all(|r| r.status == ReportStatus::Pending));

        let second = moderator.run_once(None).await.unwrap();
        assert_eq!(second.skipped, 1);
        assert!(second.removed.is_empty());
        let resolved = store.reports_for(&target).await.unwrap();
        assert!(resolved.iter().all(|r| r.status == ReportStatus::ActionTaken));

        let third = moderator.run_once(None).await.unwrap();
        assert_eq!(third.scanned, 0);
        tasks.wait_idle().await;
        assert_eq!(store.all_notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_run_once_for_single_target() {
        let f = fixture();
        let first = content(&f, "owner").await;
        let second = content(&f, "owner").await;
        let reporters = ["r1", "r2", "r3", "r4", "r5"];
        report(&f, &first, &reporters).await;
        report(&f, &second, &reporters).await;

        let summary = f.moderator.run_once(Some(&first)).await.unwrap();
        assert_eq!(summary.scanned, 1);
        assert!(f.store.find_content(&second).await.unwrap().unwrap().is_live());
    }

    #[tokio::test]
    async fn test_overlapping_run_is_rejected() {
        let f = fixture();
        let _scan = f.moderator.scan_lock.try_lock().unwrap();
        assert!(matches!(f.moderator.run_once(None).await, Err(EngineError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_removal_flushes_content_namespace() {
        let f = fixture();
        let target = content(&f, "owner").await;
        let key = CacheKey::new(&content_namespace(ContentKind::Post), "list");
        f.cache
            .read_through(&Viewer::Anonymous, &key, || async { Ok(1u32) })
            .await
            .unwrap();
        report(&f, &target, &["r1", "r2", "r3", "r4", "r5"]).await;

        f.moderator.run_once(None).await.unwrap();
        assert_eq!(f.cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_custom_scoring() {
        let store = Arc::new(MemoryStore::new());
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(LocalBroadcaster::new());
        let notifier = Notifier::new(store.clone(), store.clone(), broadcaster, TaskQueue::new());
        let moderator = AutoModerator::new(
            store.clone(),
            store.clone(),
            Arc::new(NamespaceCache::with_defaults()),
            notifier,
            AuditLogger::new("n".into()),
            ModerationConfig::default(),
        )
        .with_scoring(Arc::new(WeightedScoring {
            report_weight: 5.0,
            reporter_weight: 0.0,
        }));

        let doc = ContentDoc::new(ContentKind::Short, "owner", "", "");
        let target = doc.content_ref();
        store.insert_content(doc).await.unwrap();
        store.insert_report(ReportDoc::new(&target, "r1", "abuse")).await.unwrap();

        let summary = moderator.run_once(None).await.unwrap();
        assert_eq!(summary.removed, vec![target]);
    }

    #[tokio::test]
    async fn test_start_scans_on_interval_and_stops() {
        let f = fixture_with(ModerationConfig {
            interval: Duration::from_millis(20),
            ..Default::default()
        });
        let target = content(&f, "owner").await;
        report(&f, &target, &["r1", "r2", "r3", "r4", "r5"]).await;

        let handle = Arc::clone(&f.moderator).start().await.unwrap();
        assert!(f.moderator.is_running().await);
        assert!(Arc::clone(&f.moderator).start().await.is_err());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!f.store.find_content(&target).await.unwrap().unwrap().is_live());

        f.moderator.stop().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!f.moderator.is_running().await);
    }
}
