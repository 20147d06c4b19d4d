//! Report intake and automated moderation

pub mod reports;
pub mod scheduler;
pub mod scoring;

pub use reports::ReportIntake;
pub use scheduler::{AutoModerator, ModerationConfig, RunSummary, TargetState};
pub use scoring::{DistinctReporterScoring, ReportScoring, ScoringKind, WeightedScoring};
