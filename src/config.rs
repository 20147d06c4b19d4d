//! Configuration for Agora
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::path::PathBuf;
use uuid::Uuid;

/// Agora - interaction consistency and moderation engine
#[derive(Parser, Debug, Clone)]
#[command(name = "agora")]
#[command(about = "Interaction consistency and moderation engine for social publishing")]
pub struct Args {
    /// Unique node identifier for this engine instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Enable development mode (in-memory fallbacks when MongoDB/NATS are unreachable)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "agora")]
    pub mongodb_db: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// TTL of anonymous read-model entries in seconds
    #[arg(long, env = "CACHE_TTL_SECS", default_value = "300")]
    pub cache_ttl_secs: u64,

    /// Interval of the expired-entry sweeper in seconds
    #[arg(long, env = "CACHE_CLEANUP_INTERVAL_SECS", default_value = "60")]
    pub cache_cleanup_interval_secs: u64,

    /// Maximum number of cache entries
    #[arg(long, env = "CACHE_MAX_ENTRIES", default_value = "10000")]
    pub cache_max_entries: usize,

    /// Run the auto-moderation scheduler
    #[arg(long, env = "MODERATION_ENABLED", default_value = "true")]
    pub moderation_enabled: bool,

    /// Seconds between auto-moderation scans
    #[arg(long, env = "MODERATION_INTERVAL_SECS", default_value = "300")]
    pub moderation_interval_secs: u64,

    /// Score at or above which reported content is removed
    #[arg(long, env = "MODERATION_THRESHOLD", default_value = "5")]
    pub moderation_threshold: f64,

    /// Report scoring strategy (distinct_reporters, weighted)
    #[arg(long, env = "MODERATION_SCORING", default_value = "distinct_reporters")]
    pub moderation_scoring: String,

    /// Per-report weight for the weighted strategy
    #[arg(long, env = "MODERATION_REPORT_WEIGHT", default_value = "0.5")]
    pub report_weight: f64,

    /// Per-distinct-reporter weight for the weighted strategy
    #[arg(long, env = "MODERATION_REPORTER_WEIGHT", default_value = "1.0")]
    pub reporter_weight: f64,

    /// Append-only JSONL file recording auto-moderation removals
    #[arg(long, env = "MODERATION_AUDIT_LOG")]
    pub audit_log_path: Option<PathBuf>,

    /// Actions allowed per actor per minute (0 disables the limiter)
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value = "120")]
    pub rate_limit_per_minute: u32,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,

    /// Subject prefix for real-time events
    #[arg(long, env = "NATS_SUBJECT_PREFIX", default_value = "agora")]
    pub nats_subject_prefix: String,
}

impl Args {
    /// Whether logs should be emitted as JSON
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.log_format.to_ascii_lowercase().as_str(), "text" | "json") {
            return Err(format!("LOG_FORMAT must be 'text' or 'json', got '{}'", self.log_format));
        }

        if self.cache_ttl_secs == 0 || self.cache_cleanup_interval_secs == 0 {
            return Err("CACHE_TTL_SECS and CACHE_CLEANUP_INTERVAL_SECS must be positive".to_string());
        }

        if self.moderation_interval_secs == 0 {
            return Err("MODERATION_INTERVAL_SECS must be positive".to_string());
        }

        if !(self.moderation_threshold > 0.0) {
            return Err("MODERATION_THRESHOLD must be greater than zero".to_string());
        }

        if self.report_weight < 0.0 || self.reporter_weight < 0.0 {
            return Err("Moderation weights must not be negative".to_string());
        }

        self.moderation_scoring
            .parse::<crate::moderation::ScoringKind>()
            .map_err(|e| format!("MODERATION_SCORING: {e}"))?;

        if self.nats.nats_subject_prefix.is_empty() || self.nats.nats_subject_prefix.contains(' ') {
            return Err("NATS_SUBJECT_PREFIX must be a non-empty subject token".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["agora"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults_validate() {
        let args = parse(&[]);
        assert!(args.validate().is_ok());
        assert_eq!(args.cache_ttl_secs, 300);
        assert_eq!(args.moderation_threshold, 5.0);
        assert_eq!(args.moderation_scoring, "distinct_reporters");
        assert!(!args.json_logs());
    }

    #[test]
    fn test_rejects_unknown_scoring() {
        let args = parse(&["--moderation-scoring", "vibes"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_rejects_non_positive_threshold() {
        let args = parse(&["--moderation-threshold", "0"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_json_log_format() {
        let args = parse(&["--log-format", "JSON"]);
        assert!(args.json_logs());
        assert!(args.validate().is_ok());
    }
}
