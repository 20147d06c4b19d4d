//! Interaction consistency
//!
//! Toggles, votes and the bookmark mirror, plus the cached read path that
//! renders their counters.

pub mod feed;
pub mod mirror;
pub mod toggle;
pub mod vote;

pub use feed::{ContentView, FeedPage, FeedReader, InteractionCounts, ViewerState};
pub use mirror::BookmarkMirror;
pub use toggle::{ToggleAction, ToggleEngine, ToggleOutcome};
pub use vote::{normalize_category, OrientationView, VoteAggregator, VoteOutcome};
