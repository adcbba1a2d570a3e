use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use super::{Document, DocumentFilter, DocumentGroup, DocumentStore, FieldValue};
use crate::error::{PipelineError, Result};

/// In-memory document store for development/testing
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<Document>>>> {
        self.collections.lock().map_err(|_| PipelineError::Store {
            message: "in-memory store lock poisoned".to_string(),
        })
    }

    /// Snapshot of a collection, in insertion order.
    pub fn documents(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self.lock()?.get(collection).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn describe(&self) -> String {
        "memory://".to_string()
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }

    async fn delete_all(&self, collection: &str) -> Result<u64> {
        let removed = self
            .lock()?
            .remove(collection)
            .map(|docs| docs.len() as u64)
            .unwrap_or(0);
        debug!("Deleted {} documents from {}", removed, collection);
        Ok(removed)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64> {
        let inserted = documents.len() as u64;
        self.lock()?
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
        debug!("Inserted {} documents into {}", inserted, collection);
        Ok(inserted)
    }

    async fn count(&self, collection: &str, filter: &DocumentFilter) -> Result<u64> {
        let collections = self.lock()?;
        let count = collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn find_one(&self, collection: &str) -> Result<Option<Document>> {
        Ok(self
            .lock()?
            .get(collection)
            .and_then(|docs| docs.first())
            .cloned())
    }

    async fn group_count(
        &self,
        collection: &str,
        fields: &[String],
        min_count: u64,
    ) -> Result<Vec<DocumentGroup>> {
        let collections = self.lock()?;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        // first-seen order keeps the output stable
        let mut order: Vec<Vec<FieldValue>> = Vec::new();
        let mut counts: HashMap<Vec<FieldValue>, u64> = HashMap::new();
        for doc in docs {
            let key: Vec<FieldValue> = fields
                .iter()
                .map(|f| doc.get(f).cloned().unwrap_or(FieldValue::Null))
                .collect();
            let count = counts.entry(key.clone()).or_insert(0);
            if *count == 0 {
                order.push(key);
            }
            *count += 1;
        }

        Ok(order
            .into_iter()
            .filter_map(|key| {
                let count = counts[&key];
                (count >= min_count).then_some(DocumentGroup { key, count })
            })
            .collect())
    }
}
