//! Error taxonomy shared by every layer of the engine

use thiserror::Error;

/// Errors surfaced by the interaction and moderation engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Content or actor missing, or content soft-deleted
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request is well-formed but not applicable (e.g. unknown vote category)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Transient store failure
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Divergence between a content's bookmark set and an actor's mirror.
    /// Only produced by the mirror diagnostic, never by request paths.
    #[error(
        "Inconsistent bookmark mirror for actor {actor_id}: {} missing on actor, {} missing on content",
        missing_on_actor.len(),
        missing_on_content.len()
    )]
    InconsistentMirror {
        actor_id: String,
        /// Content that lists the actor but is absent from the actor's mirror
        missing_on_actor: Vec<String>,
        /// Content ids in the mirror whose bookmark set lacks the actor
        missing_on_content: Vec<String>,
    },

    /// Actor is suspended or banned
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Rejected by the rate-limit gate
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Real-time transport failure
    #[error("Realtime error: {0}")]
    Realtime(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether a caller may reasonably retry the same request later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::StoreUnavailable(_) | EngineError::Realtime(_) | EngineError::RateLimited(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::StoreUnavailable("down".into()).is_transient());
        assert!(EngineError::RateLimited("slow down".into()).is_transient());
        assert!(!EngineError::NotFound("post".into()).is_transient());
        assert!(!EngineError::InvalidState("category".into()).is_transient());
    }

    #[test]
    fn test_inconsistent_mirror_message() {
        let err = EngineError::InconsistentMirror {
            actor_id: "a1".into(),
            missing_on_actor: vec!["p1".into(), "p2".into()],
            missing_on_content: vec![],
        };
        let msg = err.to_string();
        assert!(msg.contains("a1"));
        assert!(msg.contains("2 missing on actor"));
        assert!(msg.contains("0 missing on content"));
    }
}
