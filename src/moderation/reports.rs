//! Report intake

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::schemas::{ContentRef, InteractionKind, InteractionUser, ReportDoc};
use crate::db::store::{ContentStore, ReportStore};
use crate::types::{EngineError, Result};

/// Longest accepted report reason, in characters
pub const MAX_REASON_LEN: usize = 1000;

#[derive(Clone)]
pub struct ReportIntake {
    content: Arc<dyn ContentStore>,
    reports: Arc<dyn ReportStore>,
}

impl ReportIntake {
    pub fn new(content: Arc<dyn ContentStore>, reports: Arc<dyn ReportStore>) -> Self {
        Self { content, reports }
    }

    /// Record one pending report against `target`.
    ///
    /// Reports against removed content are stored but never rescored.
    pub async fn file_report(&self, reporter_id: &str, target: &ContentRef, reason: &str) -> Result<ReportDoc> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::InvalidState("report reason is required".into()));
        }
        if reason.chars().count() > MAX_REASON_LEN {
            return Err(EngineError::InvalidState(format!(
                "report reason exceeds {MAX_REASON_LEN} characters"
            )));
        }

        let content = self
            .content
            .find_content(target)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("content {target}")))?;

        let report = ReportDoc::new(target, reporter_id, reason);
        self.reports.insert_report(report.clone()).await?;

        if content.is_live() {
            match self
                .content
                .add_member(target, InteractionKind::Reports, InteractionUser::now(reporter_id))
                .await
            {
                Ok(Some(_)) => debug!(content = %target, reporter_id, "Reporter recorded on content"),
                Ok(None) => {}
                Err(e) => warn!(content = %target, reporter_id, error = %e, "Failed to record reporter on content"),
            }
        } else {
            debug!(content = %target, reporter_id, "Report filed against removed content");
        }

        info!(content = %target, reporter_id, report_id = %report.id, "Report filed");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{ContentDoc, ContentKind, ReportStatus};
    use crate::db::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, ReportIntake, ContentRef) {
        let store = Arc::new(MemoryStore::new());
        let content = ContentDoc::new(ContentKind::Question, "owner", "q", "");
        let target = content.content_ref();
        store.insert_content(content).await.unwrap();
        (store.clone(), ReportIntake::new(store.clone(), store), target)
    }

    #[tokio::test]
    async fn test_file_report_records_pending() {
        let (store, intake, target) = setup().await;
        let report = intake.file_report("r1", &target, "  spam  ").await.unwrap();
        assert_eq!(report.status, ReportStatus::Pending);
        assert_eq!(report.reason, "spam");

        intake.file_report("r1", &target, "still spam").await.unwrap();
        assert_eq!(store.reports_for(&target).await.unwrap().len(), 2);

        // Reporter set is idempotent per reporter
        let content = store.find_content(&target).await.unwrap().unwrap();
        assert_eq!(content.interactions.reports.count, 1);
    }

    #[tokio::test]
    async fn test_rejects_blank_reason_and_missing_target() {
        let (store, intake, target) = setup().await;
        assert!(matches!(
            intake.file_report("r1", &target, "   ").await,
            Err(EngineError::InvalidState(_))
        ));
        let ghost = ContentRef::new(ContentKind::Post, "ghost");
        assert!(matches!(
            intake.file_report("r1", &ghost, "spam").await,
            Err(EngineError::NotFound(_))
        ));
        assert!(store.reports_for(&target).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_on_removed_content_is_stored() {
        let (store, intake, target) = setup().await;
        store.soft_delete(&target, bson::DateTime::now()).await.unwrap();

        intake.file_report("r1", &target, "spam").await.unwrap();
        assert_eq!(store.reports_for(&target).await.unwrap().len(), 1);
        let content = store.find_content(&target).await.unwrap().unwrap();
        assert_eq!(content.interactions.reports.count, 0);
    }
}
