//! Database layer
//!
//! Typed store traits over the content, actor, notification and report
//! collections, with a MongoDB adapter and an in-memory adapter.

pub mod memory;
pub mod mongo;
pub mod mongo_store;
pub mod schemas;
pub mod store;

pub use memory::MemoryStore;
pub use mongo::MongoClient;
pub use mongo_store::MongoStore;
pub use schemas::{ActorDoc, ContentDoc, ContentKind, ContentRef, Metadata, NotificationDoc, ReportDoc};
pub use store::{ActorStore, ContentStore, NotificationStore, Page, ReportStore, Stores};
