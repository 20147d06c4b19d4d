//! Actor context and action gating
//!
//! Sessions are resolved outside the engine; the engine only receives the
//! resolved identity and standing and refuses mutations from non-active actors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::schemas::ActorStatus;
use crate::types::{EngineError, Result};

/// Mutating actions an actor can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Like,
    Dislike,
    Bookmark,
    Vote,
    Report,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Like => "like",
            Action::Dislike => "dislike",
            Action::Bookmark => "bookmark",
            Action::Vote => "vote",
            Action::Report => "report",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved identity of the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: String,
    pub status: ActorStatus,
}

impl ActorContext {
    pub fn new(actor_id: &str, status: ActorStatus) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            status,
        }
    }

    /// Context of an active actor
    pub fn active(actor_id: &str) -> Self {
        Self::new(actor_id, ActorStatus::Active)
    }

    /// Refuse suspended and banned actors
    pub fn ensure_can(&self, action: Action) -> Result<()> {
        match self.status {
            ActorStatus::Active => Ok(()),
            ActorStatus::Suspended => Err(EngineError::Forbidden(format!(
                "actor {} is suspended and cannot {}",
                self.actor_id, action
            ))),
            ActorStatus::Banned => Err(EngineError::Forbidden(format!(
                "actor {} is banned and cannot {}",
                self.actor_id, action
            ))),
        }
    }
}
