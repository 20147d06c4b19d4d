//! Database schemas
//!
//! Defines MongoDB document structures for content, actors, notifications and
//! abuse reports.

mod actor;
mod content;
mod metadata;
mod notification;
mod report;

pub use actor::{ActorDoc, ActorStatus, NotificationPreferences, ACTOR_COLLECTION};
pub use content::{
    ContentDoc, ContentKind, ContentRef, InteractionKind, InteractionSet, InteractionUser,
    Interactions, OrientationCategory, OrientationCounts, PoliticalOrientation, Voter,
};
pub use metadata::Metadata;
pub use notification::{NotificationDoc, NotificationType, NOTIFICATION_COLLECTION};
pub use report::{ReportAggregate, ReportDoc, ReportStatus, REPORT_COLLECTION};
