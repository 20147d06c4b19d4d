//! Moderation audit trail
//!
//! Logs automated moderation decisions in JSONL format so operators can
//! review every removal after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::db::schemas::ContentRef;

/// Audit event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Content soft-deleted by the scheduler
    ContentRemoved,
    /// Removal was attempted but failed
    RemovalFailed,
    /// A scan finished
    ScanCompleted,
}

/// One audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Engine instance that made the decision
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ContentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports_resolved: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, node_id: String) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            node_id,
            target: None,
            score: None,
            threshold: None,
            strategy: None,
            reports_resolved: None,
            metadata: None,
        }
    }

    pub fn with_target(mut self, target: ContentRef) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the score, the threshold it was compared to and the strategy
    pub fn with_score(mut self, score: f64, threshold: f64, strategy: &str) -> Self {
        self.score = Some(score);
        self.threshold = Some(threshold);
        self.strategy = Some(strategy.to_string());
        self
    }

    pub fn with_reports_resolved(mut self, count: u64) -> Self {
        self.reports_resolved = Some(count);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Audit logger that appends events to a JSONL file.
/// Without a file, logging is a no-op.
#[derive(Clone)]
pub struct AuditLogger {
    inner: Arc<Mutex<AuditLoggerInner>>,
    node_id: String,
}

struct AuditLoggerInner {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl AuditLogger {
    pub fn new(node_id: String) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AuditLoggerInner {
                writer: None,
                path: None,
            })),
            node_id,
        }
    }

    /// Initialize file logging to the specified path
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let writer = BufWriter::new(file);

        let mut inner = self.inner.lock().await;
        inner.writer = Some(writer);
        inner.path = Some(path.clone());

        info!("Moderation audit log initialized to {}", path.display());
        Ok(())
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// File being written, if any
    pub async fn path(&self) -> Option<PathBuf> {
        self.inner.lock().await.path.clone()
    }

    /// Start an event stamped with this node
    pub fn event(&self, event_type: AuditEventType) -> AuditEvent {
        AuditEvent::new(event_type, self.node_id.clone())
    }

    pub async fn log(&self, event: AuditEvent) {
        let jsonl = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        let mut inner = self.inner.lock().await;

        if let Some(ref mut writer) = inner.writer {
            if let Err(e) = writeln!(writer, "{}", jsonl) {
                error!("Failed to write audit event: {}", e);
            }
            if let Err(e) = writer.flush() {
                error!("Failed to flush audit log: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::ContentKind;

    #[test]
    fn test_event_jsonl_shape() {
        let event = AuditEvent::new(AuditEventType::ContentRemoved, "node-1".into())
            .with_target(ContentRef::new(ContentKind::Post, "p1"))
            .with_score(5.0, 5.0, "distinct_reporters")
            .with_reports_resolved(5);

        let line = event.to_jsonl().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event_type"], "content_removed");
        assert_eq!(value["target"]["id"], "p1");
        assert_eq!(value["reports_resolved"], 5);
        assert!(value.get("metadata").is_none());
    }

    #[tokio::test]
    async fn test_logger_appends_lines() {
        let path = std::env::temp_dir().join(format!("agora-audit-{}.jsonl", uuid::Uuid::new_v4()));
        let logger = AuditLogger::new("node-1".into());
        logger.init_file(path.clone()).await.unwrap();
        assert_eq!(logger.path().await, Some(path.clone()));

        logger.log(logger.event(AuditEventType::ScanCompleted)).await;
        logger.log(logger.event(AuditEventType::ContentRemoved)).await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_logger_without_file_is_noop() {
        let logger = AuditLogger::new("node-1".into());
        logger.log(logger.event(AuditEventType::ScanCompleted)).await;
    }
}
