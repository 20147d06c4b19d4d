//! MongoDB client and index helpers

use bson::{doc, DateTime, Document};
use mongodb::{options::IndexOptions, Client, Collection, IndexModel};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use tracing::info;

use crate::db::schemas::Metadata;
use crate::types::EngineError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// Fill in creation timestamps before insert
pub fn stamp_created<T: MutMetadata>(item: &mut T) {
    let metadata = item.mut_metadata();
    let now = DateTime::now();
    metadata.is_deleted = false;
    metadata.deleted_at = None;
    metadata.created_at.get_or_insert(now);
    metadata.updated_at = Some(now);
}

/// Map a driver error onto the engine's transient-store variant
pub(crate) fn unavailable(operation: &str, e: impl Display) -> EngineError {
    EngineError::StoreUnavailable(format!("{operation} failed: {e}"))
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, EngineError> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| unavailable("Connect to MongoDB", e))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| unavailable("MongoDB ping", e))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection with its schema indexes applied
    pub async fn collection<T>(&self, name: &str) -> Result<Collection<T>, EngineError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        let collection = self.client.database(&self.db_name).collection::<T>(name);
        apply_indexes::<T>(&collection).await?;
        Ok(collection)
    }

    /// Get the raw MongoDB client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Apply schema-defined indexes
async fn apply_indexes<T>(collection: &Collection<T>) -> Result<(), EngineError>
where
    T: IntoIndexes + Send + Sync,
{
    let schema_indices = T::into_indices();

    if schema_indices.is_empty() {
        return Ok(());
    }

    let indices: Vec<IndexModel> = schema_indices
        .into_iter()
        .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
        .collect();

    collection
        .create_indexes(indices)
        .await
        .map_err(|e| unavailable("Create indexes", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{ContentDoc, ContentKind};

    #[test]
    fn test_stamp_created_keeps_existing_creation_time() {
        let mut content = ContentDoc::new(ContentKind::Post, "o", "t", "b");
        let created = content.metadata.created_at;
        content.metadata.is_deleted = true;
        stamp_created(&mut content);
        assert_eq!(content.metadata.created_at, created);
        assert!(!content.metadata.is_deleted);
        assert!(content.metadata.updated_at.is_some());
    }

    #[test]
    fn test_unavailable_message() {
        let err = unavailable("Find", "connection reset");
        assert_eq!(err.to_string(), "Store unavailable: Find failed: connection reset");
    }
}
