//! Abuse report document schema

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::{ContentKind, ContentRef};

/// Collection name for reports
pub const REPORT_COLLECTION: &str = "reports";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Pending,
    Reviewed,
    Resolved,
    Dismissed,
    ActionTaken,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Reviewed => "reviewed",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
            ReportStatus::ActionTaken => "action_taken",
        }
    }
}

/// Report document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReportDoc {
    #[serde(rename = "_id")]
    pub id: String,

    pub target_type: ContentKind,

    pub target_id: String,

    pub reporter_id: String,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub status: ReportStatus,

    pub created_at: DateTime,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
}

impl ReportDoc {
    /// Create a new pending report
    pub fn new(target: &ContentRef, reporter_id: &str, reason: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target_type: target.kind,
            target_id: target.id.clone(),
            reporter_id: reporter_id.to_string(),
            reason: reason.to_string(),
            status: ReportStatus::Pending,
            created_at: DateTime::now(),
            reviewed_at: None,
            reviewed_by: None,
        }
    }

    pub fn target(&self) -> ContentRef {
        ContentRef::new(self.target_type, self.target_id.clone())
    }
}

/// Pending reports grouped by target
#[derive(Clone, Debug, PartialEq)]
pub struct ReportAggregate {
    pub target: ContentRef,
    pub report_count: u64,
    pub distinct_reporters: u64,
}

impl IntoIndexes for ReportDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "status": 1, "target_type": 1, "target_id": 1 },
            Some(IndexOptions::builder().name("status_target_index".to_string()).build()),
        )]
    }
}
