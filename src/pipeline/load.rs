use std::path::Path;

use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::artifact::CsvInput;
use super::SkippedRecord;
use crate::error::{PipelineError, Result};
use crate::record::{PatientRecord, RawRecord};
use crate::storage::{Document, DocumentStore};

/// Outcome of a full-replacement load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub endpoint: String,
    pub collection: String,
    pub rows_read: usize,
    pub deleted: u64,
    pub inserted: u64,
    pub skipped: Vec<SkippedRecord>,
}

/// Documents coerced from the cleaned artifact, ready for insertion.
#[derive(Debug, Default)]
pub struct CoercedBatch {
    pub rows_read: usize,
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedRecord>,
}

/// Reads the cleaned artifact and coerces every row. Rows that fail coercion
/// are recorded in `skipped` and left out.
pub fn coerce_artifact(path: &Path) -> Result<CoercedBatch> {
    let mut input = CsvInput::open(path)?;
    let mut batch = CoercedBatch::default();

    while let Some(row) = input.next_row()? {
        batch.rows_read += 1;
        let coerced = row.values.and_then(|values| {
            let raw = RawRecord::new(input.header(), values);
            PatientRecord::coerce(&raw).map(|patient| patient.to_document(input.header()))
        });
        match coerced {
            Ok(doc) => batch.documents.push(doc),
            Err(reason) => {
                warn!("Skipping row {} of {}: {}", row.line, path.display(), reason);
                batch.skipped.push(SkippedRecord {
                    line: row.line,
                    reason: reason.to_string(),
                });
            }
        }
    }
    Ok(batch)
}

/// Replaces the contents of one collection with the cleaned artifact.
pub struct Loader<'a> {
    store: &'a dyn DocumentStore,
    collection: &'a str,
    max_bulk_insert: usize,
}

impl<'a> Loader<'a> {
    pub fn new(store: &'a dyn DocumentStore, collection: &'a str, max_bulk_insert: usize) -> Self {
        Self {
            store,
            collection,
            max_bulk_insert,
        }
    }

    /// Ping, read and coerce, check the batch limit, delete, then one bulk
    /// insert. Nothing is deleted unless the artifact was read successfully
    /// and fits in a single insert.
    #[instrument(skip(self), fields(collection = %self.collection))]
    pub async fn load_file(&self, path: &Path) -> Result<LoadSummary> {
        let endpoint = self.store.describe();
        self.store
            .ping()
            .await
            .map_err(|e| PipelineError::Connection {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;

        let batch = coerce_artifact(path)?;
        if batch.documents.len() > self.max_bulk_insert {
            return Err(PipelineError::BatchTooLarge {
                count: batch.documents.len(),
                limit: self.max_bulk_insert,
            });
        }

        let deleted = self.store.delete_all(self.collection).await?;
        info!("🗑️  Deleted {} existing documents from {}", deleted, self.collection);

        let inserted = if batch.documents.is_empty() {
            debug!("No documents to insert");
            0
        } else {
            self.store
                .insert_many(self.collection, batch.documents)
                .await?
        };
        info!("💾 Inserted {} documents into {}", inserted, self.collection);

        counter!("healthcare_documents_inserted_total").increment(inserted);
        counter!("healthcare_load_skipped_total").increment(batch.skipped.len() as u64);

        Ok(LoadSummary {
            endpoint,
            collection: self.collection.to_string(),
            rows_read: batch.rows_read,
            deleted,
            inserted,
            skipped: batch.skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DocumentFilter, FieldValue, InMemoryDocumentStore};
    use std::fs;

    const HEADER: &str = "Name,Age,Gender,Medical Condition,Date of Admission,Doctor,Hospital,Insurance Provider,Billing Amount,Admission Type,Discharge Date,Medication,Test Results";

    fn write_artifact(dir: &Path, rows: &[&str]) -> std::path::PathBuf {
        let path = dir.join("cleaned.csv");
        let mut text = format!("{HEADER}\n");
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        fs::write(&path, text).unwrap();
        path
    }

    const ANN: &str = "Ann Lee,30,Female,Flu,2024-01-01,Bo Ray,Mercy,Aetna,100.01,Urgent,2024-01-03,Aspirin,Normal";
    const BO: &str = "Bo Ray,41,Male,Asthma,2024-02-01,Cy Dee,Mercy,Cigna,5.00,Elective,2024-02-02,Ibuprofen,Abnormal";

    #[tokio::test]
    async fn test_load_replaces_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), &[ANN, BO]);
        let store = InMemoryDocumentStore::new();
        store
            .insert_many("patients", vec![Document::new(), Document::new(), Document::new()])
            .await
            .unwrap();

        let summary = Loader::new(&store, "patients", 10).load_file(&path).await.unwrap();
        assert_eq!(summary.deleted, 3);
        assert_eq!(summary.inserted, 2);
        assert!(summary.skipped.is_empty());
        assert_eq!(store.count("patients", &DocumentFilter::All).await.unwrap(), 2);

        let first = store.find_one("patients").await.unwrap().unwrap();
        assert_eq!(first.get("Age"), Some(&FieldValue::Int(30)));
        assert_eq!(first.get("Billing Amount").unwrap().to_string(), "100.01");
    }

    #[tokio::test]
    async fn test_coercion_failures_skip_only_that_row() {
        let dir = tempfile::tempdir().unwrap();
        let bad_age = ANN.replacen(",30,", ",thirty,", 1);
        let bad_amount = BO.replace("5.00", "5.005");
        let path = write_artifact(dir.path(), &[ANN, &bad_age, &bad_amount]);
        let store = InMemoryDocumentStore::new();

        let summary = Loader::new(&store, "patients", 10).load_file(&path).await.unwrap();
        assert_eq!(summary.rows_read, 3);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped.len(), 2);
        assert_eq!(summary.skipped[0].line, 3);
        assert!(summary.skipped[0].reason.contains("Age"));
        assert!(summary.skipped[1].reason.contains("Billing Amount"));
    }

    #[tokio::test]
    async fn test_oversized_batch_leaves_collection_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), &[ANN, BO]);
        let store = InMemoryDocumentStore::new();
        store.insert_many("patients", vec![Document::new()]).await.unwrap();

        let err = Loader::new(&store, "patients", 1).load_file(&path).await.unwrap_err();
        assert!(matches!(err, PipelineError::BatchTooLarge { count: 2, limit: 1 }));
        assert_eq!(store.count("patients", &DocumentFilter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_artifact_leaves_collection_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryDocumentStore::new();
        store.insert_many("patients", vec![Document::new()]).await.unwrap();

        let err = Loader::new(&store, "patients", 10)
            .load_file(&dir.path().join("missing.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InputMissing { .. }));
        assert_eq!(store.count("patients", &DocumentFilter::All).await.unwrap(), 1);
    }
}
