//! The destination document store.
//!
//! The pipeline needs only a handful of collection-level operations; every
//! backend implements them behind [`DocumentStore`].

mod document;
pub mod in_memory;
pub mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::error::{PipelineError, Result};

pub use document::{Document, DocumentFilter, DocumentGroup, FieldValue};
pub use in_memory::InMemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

/// Storage trait for the loaded collection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable location, used in log lines.
    fn describe(&self) -> String;

    /// Liveness check run before any work.
    async fn ping(&self) -> Result<()>;

    /// Removes every document in `collection`, returning how many were removed.
    async fn delete_all(&self, collection: &str) -> Result<u64>;

    /// Inserts all `documents` in one call.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64>;

    async fn count(&self, collection: &str, filter: &DocumentFilter) -> Result<u64>;

    /// Any one document of the collection.
    async fn find_one(&self, collection: &str) -> Result<Option<Document>>;

    /// Groups all documents by the values of `fields` (missing fields group as
    /// null) and returns the groups holding at least `min_count` documents.
    async fn group_count(
        &self,
        collection: &str,
        fields: &[String],
        min_count: u64,
    ) -> Result<Vec<DocumentGroup>>;
}

/// Parsed form of the `STORE_URI` setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEndpoint {
    Memory,
    /// Directory holding one `<database>.db` file per database.
    Sqlite(PathBuf),
}

impl StoreEndpoint {
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri == "memory" || uri == "memory://" {
            return Ok(StoreEndpoint::Memory);
        }
        match uri.strip_prefix("sqlite://") {
            Some(path) if !path.is_empty() => Ok(StoreEndpoint::Sqlite(PathBuf::from(path))),
            _ => Err(PipelineError::Config(format!(
                "unsupported store URI '{uri}' (expected memory:// or sqlite://<dir>)"
            ))),
        }
    }
}

/// Opens the configured store and runs its liveness check. Any failure here is
/// a connection error.
pub async fn connect(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    let endpoint = StoreEndpoint::parse(&config.store_uri)?;
    let connection_error = |message: String| PipelineError::Connection {
        endpoint: config.store_uri.clone(),
        message,
    };

    let store: Arc<dyn DocumentStore> = match endpoint {
        StoreEndpoint::Memory => Arc::new(InMemoryDocumentStore::new()),
        StoreEndpoint::Sqlite(dir) => Arc::new(
            SqliteDocumentStore::open(&dir, &config.database)
                .map_err(|e| connection_error(e.to_string()))?,
        ),
    };

    store
        .ping()
        .await
        .map_err(|e| connection_error(e.to_string()))?;
    info!("Connected to document store at {}", store.describe());
    Ok(store)
}
