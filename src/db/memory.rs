//! In-memory store (for testing/local development)
//!
//! Each document lives in a `DashMap` entry; mutations run while holding that
//! entry's write guard, which gives the same single-document atomicity the
//! MongoDB adapter gets from `update_one`. Nothing spans two documents.

use async_trait::async_trait;
use bson::DateTime;
use dashmap::{DashMap, DashSet};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::db::schemas::{
    ActorDoc, ContentDoc, ContentKind, ContentRef, InteractionKind, InteractionUser,
    NotificationDoc, OrientationCategory, ReportAggregate, ReportDoc, ReportStatus, Voter,
};
use crate::db::store::{ActorStore, ContentStore, NotificationStore, Page, ReportStore};
use crate::types::{EngineError, Result};

/// Simple in-memory document store
pub struct MemoryStore {
    contents: DashMap<ContentRef, ContentDoc>,
    actors: DashMap<String, ActorDoc>,
    notifications: DashMap<String, NotificationDoc>,
    /// event_id -> notification id (unique index equivalent)
    notification_events: DashMap<String, String>,
    reports: DashMap<String, ReportDoc>,

    // Fault injection, so callers can observe StoreUnavailable handling
    fail_actor_writes: AtomicBool,
    fail_notification_writes: AtomicBool,
    fail_content_writes: AtomicBool,
    failing_contents: DashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            contents: DashMap::new(),
            actors: DashMap::new(),
            notifications: DashMap::new(),
            notification_events: DashMap::new(),
            reports: DashMap::new(),
            fail_actor_writes: AtomicBool::new(false),
            fail_notification_writes: AtomicBool::new(false),
            fail_content_writes: AtomicBool::new(false),
            failing_contents: DashSet::new(),
        }
    }

    /// Make every actor-side write fail with `StoreUnavailable`
    pub fn fail_actor_writes(&self, fail: bool) {
        self.fail_actor_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every notification insert fail with `StoreUnavailable`
    pub fn fail_notification_writes(&self, fail: bool) {
        self.fail_notification_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every content-side write fail with `StoreUnavailable`
    pub fn fail_content_writes(&self, fail: bool) {
        self.fail_content_writes.store(fail, Ordering::SeqCst);
    }

    /// Make writes to one content id fail with `StoreUnavailable`
    pub fn fail_content(&self, content_id: &str) {
        self.failing_contents.insert(content_id.to_string());
    }

    /// Raw mutable access for seeding divergent states
    pub fn with_content_mut<R>(&self, target: &ContentRef, f: impl FnOnce(&mut ContentDoc) -> R) -> Option<R> {
        self.contents.get_mut(target).map(|mut entry| f(entry.value_mut()))
    }

    /// Raw mutable access for seeding divergent states
    pub fn with_actor_mut<R>(&self, actor_id: &str, f: impl FnOnce(&mut ActorDoc) -> R) -> Option<R> {
        self.actors.get_mut(actor_id).map(|mut entry| f(entry.value_mut()))
    }

    /// Every stored notification, oldest first
    pub fn all_notifications(&self) -> Vec<NotificationDoc> {
        let mut all: Vec<NotificationDoc> = self.notifications.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    fn check_content_write(&self, target: &ContentRef) -> Result<()> {
        if self.fail_content_writes.load(Ordering::SeqCst) || self.failing_contents.contains(&target.id) {
            return Err(EngineError::StoreUnavailable(format!(
                "Update failed: content {target} unavailable"
            )));
        }
        Ok(())
    }

    fn check_actor_write(&self) -> Result<()> {
        if self.fail_actor_writes.load(Ordering::SeqCst) {
            return Err(EngineError::StoreUnavailable("Update failed: users unavailable".into()));
        }
        Ok(())
    }

    /// Apply `f` to a live content under its entry lock; `None` when missing,
    /// deleted, or when `f` declines.
    fn update_live(
        &self,
        target: &ContentRef,
        f: impl FnOnce(&mut ContentDoc) -> bool,
    ) -> Result<Option<ContentDoc>> {
        self.check_content_write(target)?;
        let Some(mut entry) = self.contents.get_mut(target) else {
            return Ok(None);
        };
        let content = entry.value_mut();
        if !content.is_live() || !f(content) {
            return Ok(None);
        }
        content.metadata.updated_at = Some(DateTime::now());
        Ok(Some(content.clone()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn add_to_set(set: &mut Vec<String>, value: &str) {
    if !set.iter().any(|v| v == value) {
        set.push(value.to_string());
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert_content(&self, content: ContentDoc) -> Result<()> {
        let target = content.content_ref();
        self.check_content_write(&target)?;
        if self.contents.contains_key(&target) {
            return Err(EngineError::InvalidState(format!("content {target} already exists")));
        }
        self.contents.insert(target, content);
        Ok(())
    }

    async fn find_content(&self, target: &ContentRef) -> Result<Option<ContentDoc>> {
        Ok(self.contents.get(target).map(|e| e.value().clone()))
    }

    async fn find_contents(&self, ids: &[String]) -> Result<Vec<ContentDoc>> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut found: Vec<ContentDoc> = self
            .contents
            .iter()
            .filter(|e| e.value().is_live() && wanted.contains(e.key().id.as_str()))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| b.metadata.created_at.cmp(&a.metadata.created_at));
        Ok(found)
    }

    async fn list_live(&self, kind: ContentKind, page: Page) -> Result<Vec<ContentDoc>> {
        let mut live: Vec<ContentDoc> = self
            .contents
            .iter()
            .filter(|e| e.key().kind == kind && e.value().is_live())
            .map(|e| e.value().clone())
            .collect();
        live.sort_by(|a, b| {
            b.metadata
                .created_at
                .cmp(&a.metadata.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(live
            .into_iter()
            .skip(page.skip as usize)
            .take(page.limit.max(0) as usize)
            .collect())
    }

    async fn count_live(&self, kind: ContentKind) -> Result<u64> {
        Ok(self
            .contents
            .iter()
            .filter(|e| e.key().kind == kind && e.value().is_live())
            .count() as u64)
    }

    async fn add_member(
        &self,
        target: &ContentRef,
        kind: InteractionKind,
        member: InteractionUser,
    ) -> Result<Option<ContentDoc>> {
        self.update_live(target, |content| {
            let set = content.interactions.get_mut(kind);
            if set.contains(&member.actor_id) {
                return false;
            }
            set.users.push(member);
            set.count += 1;
            true
        })
    }

    async fn remove_member(
        &self,
        target: &ContentRef,
        kind: InteractionKind,
        actor_id: &str,
    ) -> Result<Option<ContentDoc>> {
        self.update_live(target, |content| {
            let set = content.interactions.get_mut(kind);
            if !set.contains(actor_id) {
                return false;
            }
            set.users.retain(|u| u.actor_id != actor_id);
            set.count = (set.count - 1).max(0);
            true
        })
    }

    async fn record_vote(&self, target: &ContentRef, voter: Voter) -> Result<Option<ContentDoc>> {
        self.update_live(target, |content| {
            let orientation = &mut content.political_orientation;
            if orientation.vote_of(&voter.actor_id).is_some() {
                return false;
            }
            *orientation.counts.get_mut(voter.category) += 1;
            orientation.voters.push(voter);
            true
        })
    }

    async fn change_vote(
        &self,
        target: &ContentRef,
        actor_id: &str,
        from: OrientationCategory,
        to: OrientationCategory,
        at: DateTime,
    ) -> Result<Option<ContentDoc>> {
        self.update_live(target, |content| {
            let orientation = &mut content.political_orientation;
            let Some(voter) = orientation
                .voters
                .iter_mut()
                .find(|v| v.actor_id == actor_id && v.category == from)
            else {
                return false;
            };
            voter.category = to;
            voter.voted_at = at;
            *orientation.counts.get_mut(from) -= 1;
            *orientation.counts.get_mut(to) += 1;
            true
        })
    }

    async fn soft_delete(&self, target: &ContentRef, at: DateTime) -> Result<bool> {
        let updated = self.update_live(target, |content| {
            content.metadata.mark_deleted(at);
            true
        })?;
        Ok(updated.is_some())
    }

    async fn contents_with_member(
        &self,
        kind: InteractionKind,
        actor_id: &str,
    ) -> Result<Vec<ContentRef>> {
        Ok(self
            .contents
            .iter()
            .filter(|e| e.value().interactions.get(kind).contains(actor_id))
            .map(|e| e.key().clone())
            .collect())
    }
}

#[async_trait]
impl ActorStore for MemoryStore {
    async fn insert_actor(&self, actor: ActorDoc) -> Result<()> {
        self.check_actor_write()?;
        if self.actors.contains_key(&actor.id) {
            return Err(EngineError::InvalidState(format!("actor {} already exists", actor.id)));
        }
        self.actors.insert(actor.id.clone(), actor);
        Ok(())
    }

    async fn find_actor(&self, actor_id: &str) -> Result<Option<ActorDoc>> {
        Ok(self.actors.get(actor_id).map(|e| e.value().clone()))
    }

    async fn add_bookmark(&self, actor_id: &str, content_id: &str) -> Result<bool> {
        self.check_actor_write()?;
        let Some(mut entry) = self.actors.get_mut(actor_id) else {
            return Ok(false);
        };
        let actor = entry.value_mut();
        add_to_set(&mut actor.bookmarks, content_id);
        add_to_set(&mut actor.saved_posts, content_id);
        actor.metadata.updated_at = Some(DateTime::now());
        Ok(true)
    }

    async fn remove_bookmark(&self, actor_id: &str, content_id: &str) -> Result<bool> {
        self.check_actor_write()?;
        let Some(mut entry) = self.actors.get_mut(actor_id) else {
            return Ok(false);
        };
        let actor = entry.value_mut();
        actor.bookmarks.retain(|id| id != content_id);
        actor.saved_posts.retain(|id| id != content_id);
        actor.metadata.updated_at = Some(DateTime::now());
        Ok(true)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: NotificationDoc) -> Result<bool> {
        if self.fail_notification_writes.load(Ordering::SeqCst) {
            return Err(EngineError::StoreUnavailable(
                "Insert failed: notifications unavailable".into(),
            ));
        }
        // Unique event_id: the entry lock makes check-and-claim atomic
        match self.notification_events.entry(notification.event_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(notification.id.clone());
                self.notifications.insert(notification.id.clone(), notification);
                Ok(true)
            }
        }
    }

    async fn list_notifications(
        &self,
        recipient_id: &str,
        unread_only: bool,
        page: Page,
    ) -> Result<Vec<NotificationDoc>> {
        let mut matching: Vec<NotificationDoc> = self
            .notifications
            .iter()
            .filter(|e| e.recipient_id == recipient_id && (!unread_only || !e.read))
            .map(|e| e.value().clone())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(matching
            .into_iter()
            .skip(page.skip as usize)
            .take(page.limit.max(0) as usize)
            .collect())
    }

    async fn count_unread(&self, recipient_id: &str) -> Result<u64> {
        Ok(self
            .notifications
            .iter()
            .filter(|e| e.recipient_id == recipient_id && !e.read)
            .count() as u64)
    }

    async fn mark_read(&self, id: &str, recipient_id: &str, at: DateTime) -> Result<bool> {
        let Some(mut entry) = self.notifications.get_mut(id) else {
            return Ok(false);
        };
        let notification = entry.value_mut();
        if notification.recipient_id != recipient_id {
            return Ok(false);
        }
        if !notification.read {
            notification.read = true;
            notification.read_at = Some(at);
        }
        Ok(true)
    }

    async fn mark_all_read(&self, recipient_id: &str, at: DateTime) -> Result<u64> {
        let mut changed = 0;
        for mut entry in self.notifications.iter_mut() {
            let notification = entry.value_mut();
            if notification.recipient_id == recipient_id && !notification.read {
                notification.read = true;
                notification.read_at = Some(at);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_notification(&self, id: &str, recipient_id: &str) -> Result<bool> {
        let removed = self
            .notifications
            .remove_if(id, |_, n| n.recipient_id == recipient_id);
        Ok(removed.is_some())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn insert_report(&self, report: ReportDoc) -> Result<()> {
        self.reports.insert(report.id.clone(), report);
        Ok(())
    }

    async fn pending_aggregates(&self, target: Option<&ContentRef>) -> Result<Vec<ReportAggregate>> {
        let mut groups: HashMap<ContentRef, (u64, HashSet<String>)> = HashMap::new();
        for entry in self.reports.iter() {
            let report = entry.value();
            if report.status != ReportStatus::Pending {
                continue;
            }
            let report_target = report.target();
            if target.is_some_and(|t| *t != report_target) {
                continue;
            }
            let group = groups.entry(report_target).or_default();
            group.0 += 1;
            group.1.insert(report.reporter_id.clone());
        }

        let mut aggregates: Vec<ReportAggregate> = groups
            .into_iter()
            .map(|(target, (report_count, reporters))| ReportAggregate {
                target,
                report_count,
                distinct_reporters: reporters.len() as u64,
            })
            .collect();
        aggregates.sort_by(|a, b| {
            (a.target.kind.as_str(), &a.target.id).cmp(&(b.target.kind.as_str(), &b.target.id))
        });
        Ok(aggregates)
    }

    async fn resolve_reports(
        &self,
        target: &ContentRef,
        status: ReportStatus,
        reviewed_by: &str,
        at: DateTime,
    ) -> Result<u64> {
        let mut changed = 0;
        for mut entry in self.reports.iter_mut() {
            let report = entry.value_mut();
            if report.target() != *target
                || !matches!(report.status, ReportStatus::Pending | ReportStatus::Reviewed)
            {
                continue;
            }
            report.status = status;
            report.reviewed_at = Some(at);
            report.reviewed_by = Some(reviewed_by.to_string());
            changed += 1;
        }
        Ok(changed)
    }

    async fn reports_for(&self, target: &ContentRef) -> Result<Vec<ReportDoc>> {
        let mut reports: Vec<ReportDoc> = self
            .reports
            .iter()
            .filter(|e| e.value().target() == *target)
            .map(|e| e.value().clone())
            .collect();
        reports.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(reports)
    }
}
