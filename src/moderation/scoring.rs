//! Report scoring strategies

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::db::schemas::ReportAggregate;

/// Turns a target's pending reports into a score compared with the threshold
pub trait ReportScoring: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, aggregate: &ReportAggregate) -> f64;
}

/// One point per distinct reporter; repeat reports from the same actor don't count
#[derive(Debug, Clone, Copy, Default)]
pub struct DistinctReporterScoring;

impl ReportScoring for DistinctReporterScoring {
    fn name(&self) -> &'static str {
        "distinct_reporters"
    }

    fn score(&self, aggregate: &ReportAggregate) -> f64 {
        aggregate.distinct_reporters as f64
    }
}

/// `report_weight * reports + reporter_weight * distinct_reporters`
#[derive(Debug, Clone, Copy)]
pub struct WeightedScoring {
    pub report_weight: f64,
    pub reporter_weight: f64,
}

impl Default for WeightedScoring {
    fn default() -> Self {
        Self {
            report_weight: 0.5,
            reporter_weight: 1.0,
        }
    }
}

impl ReportScoring for WeightedScoring {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn score(&self, aggregate: &ReportAggregate) -> f64 {
        self.report_weight * aggregate.report_count as f64
            + self.reporter_weight * aggregate.distinct_reporters as f64
    }
}

/// Strategy selector as configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoringKind {
    #[default]
    DistinctReporters,
    Weighted,
}

impl ScoringKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoringKind::DistinctReporters => "distinct_reporters",
            ScoringKind::Weighted => "weighted",
        }
    }

    pub fn build(self, report_weight: f64, reporter_weight: f64) -> Arc<dyn ReportScoring> {
        match self {
            ScoringKind::DistinctReporters => Arc::new(DistinctReporterScoring),
            ScoringKind::Weighted => Arc::new(WeightedScoring {
                report_weight,
                reporter_weight,
            }),
        }
    }
}

impl fmt::Display for ScoringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoringKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "distinct_reporters" | "distinct" => Ok(ScoringKind::DistinctReporters),
            "weighted" => Ok(ScoringKind::Weighted),
            other => Err(format!(
                "unknown scoring strategy '{other}' (expected distinct_reporters or weighted)"
            )),
        }
    }
}
