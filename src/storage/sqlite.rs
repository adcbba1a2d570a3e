use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection};
use tracing::debug;

use super::{Document, DocumentFilter, DocumentGroup, DocumentStore, FieldValue};
use crate::error::{PipelineError, Result};

/// Document store embedded in a SQLite file. Each document is one row holding
/// its JSON body; queries reach into the body with SQLite's JSON functions.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    location: String,
}

impl SqliteDocumentStore {
    /// Opens (creating if needed) `<dir>/<database>.db`.
    pub fn open<P: AsRef<Path>>(dir: P, database: &str) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let db_path: PathBuf = dir.join(format!("{database}.db"));
        let conn = Connection::open(&db_path)?;
        Self::with_connection(conn, format!("sqlite://{}", db_path.display()))
    }

    #[cfg(test)]
    fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, "sqlite://:memory:".to_string())
    }

    fn with_connection(conn: Connection, location: String) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS documents (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                collection  TEXT NOT NULL,
                body        TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents (collection);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            location,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| PipelineError::Store {
            message: "sqlite connection lock poisoned".to_string(),
        })
    }
}

/// JSON path selecting a top-level key. Keys are quoted since field names
/// contain spaces; there is no escape for `"`, which header resolution rejects.
fn json_path(field: &str) -> String {
    format!("$.\"{field}\"")
}

/// Canonical JSON text of a value, matching what `json_quote(json_extract(..))`
/// yields for the same stored value.
fn json_text(value: &FieldValue) -> Result<String> {
    Ok(serde_json::to_string(&value.to_json())?)
}

fn decode_body(body: &str) -> Result<Document> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    Document::from_json(&value).map_err(|message| PipelineError::Store { message })
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn describe(&self) -> String {
        self.location.clone()
    }

    async fn ping(&self) -> Result<()> {
        let one: i64 = self.conn()?.query_row("SELECT 1", [], |row| row.get(0))?;
        if one != 1 {
            return Err(PipelineError::Store {
                message: format!("liveness query returned {one}"),
            });
        }
        Ok(())
    }

    async fn delete_all(&self, collection: &str) -> Result<u64> {
        let removed = self.conn()?.execute(
            "DELETE FROM documents WHERE collection = ?1",
            params![collection],
        )?;
        debug!("Deleted {} documents from {}", removed, collection);
        Ok(removed as u64)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<u64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT INTO documents (collection, body) VALUES (?1, ?2)")?;
            for doc in &documents {
                let body = serde_json::to_string(&doc.to_json())?;
                stmt.execute(params![collection, body])?;
            }
        }
        tx.commit()?;
        debug!("Inserted {} documents into {}", documents.len(), collection);
        Ok(documents.len() as u64)
    }

    async fn count(&self, collection: &str, filter: &DocumentFilter) -> Result<u64> {
        let mut sql = "SELECT COUNT(*) FROM documents WHERE collection = ?1".to_string();
        let mut args: Vec<String> = vec![collection.to_string()];

        match filter {
            DocumentFilter::All => {}
            DocumentFilter::FieldIn { field, values } => {
                if values.is_empty() {
                    return Ok(0);
                }
                args.push(json_path(field));
                let placeholders: Vec<String> =
                    (0..values.len()).map(|i| format!("?{}", i + 3)).collect();
                sql.push_str(&format!(
                    " AND json_quote(json_extract(body, ?2)) IN ({})",
                    placeholders.join(", ")
                ));
                for value in values {
                    args.push(json_text(value)?);
                }
            }
            DocumentFilter::FieldMissing { field } => {
                args.push(json_path(field));
                sql.push_str(" AND json_type(body, ?2) IS NULL");
            }
        }

        let count: i64 = self
            .conn()?
            .query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))?;
        Ok(count as u64)
    }

    async fn find_one(&self, collection: &str) -> Result<Option<Document>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT body FROM documents WHERE collection = ?1 ORDER BY id LIMIT 1")?;
        let mut rows = stmt.query(params![collection])?;
        if let Some(row) = rows.next()? {
            let body: String = row.get(0)?;
            Ok(Some(decode_body(&body)?))
        } else {
            Ok(None)
        }
    }

    async fn group_count(
        &self,
        collection: &str,
        fields: &[String],
        min_count: u64,
    ) -> Result<Vec<DocumentGroup>> {
        if fields.is_empty() {
            let total = self.count(collection, &DocumentFilter::All).await?;
            return Ok(if total > 0 && total >= min_count {
                vec![DocumentGroup {
                    key: Vec::new(),
                    count: total,
                }]
            } else {
                Vec::new()
            });
        }

        let n = fields.len();
        let select: Vec<String> = (0..n)
            .map(|i| format!("json_quote(json_extract(body, ?{}))", i + 2))
            .collect();
        let group_by: Vec<String> = (1..=n).map(|i| i.to_string()).collect();
        let sql = format!(
            "SELECT {}, COUNT(*) FROM documents WHERE collection = ?1 GROUP BY {} HAVING COUNT(*) >= {} ORDER BY MIN(id)",
            select.join(", "),
            group_by.join(", "),
            min_count
        );

        let mut args: Vec<String> = Vec::with_capacity(n + 1);
        args.push(collection.to_string());
        args.extend(fields.iter().map(|f| json_path(f)));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args.iter()))?;
        let mut groups = Vec::new();
        while let Some(row) = rows.next()? {
            let mut key = Vec::with_capacity(n);
            for i in 0..n {
                let text: String = row.get(i)?;
                let value: serde_json::Value = serde_json::from_str(&text)?;
                key.push(FieldValue::from_json(&value).map_err(|message| PipelineError::Store { message })?);
            }
            let count: i64 = row.get(n)?;
            groups.push(DocumentGroup {
                key,
                count: count as u64,
            });
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::FixedDecimal;
    use chrono::NaiveDate;

    fn doc(name: Option<&str>, amount: i64) -> Document {
        let mut d = Document::new();
        if let Some(name) = name {
            d.insert("Name", FieldValue::Text(name.to_string()));
        }
        d.insert("Billing Amount", FieldValue::Decimal(FixedDecimal::from_hundredths(amount)));
        d.insert(
            "Date of Admission",
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()),
        );
        d
    }

    #[tokio::test]
    async fn test_round_trips_typed_documents() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.ping().await.unwrap();
        store.insert_many("patients", vec![doc(Some("Ann"), 10001)]).await.unwrap();

        let found = store.find_one("patients").await.unwrap().unwrap();
        assert_eq!(found.get("Name"), Some(&FieldValue::Text("Ann".into())));
        assert_eq!(
            found.get("Billing Amount"),
            Some(&FieldValue::Decimal(FixedDecimal::from_hundredths(10001)))
        );
        assert!(store.find_one("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_count_filters() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .insert_many(
                "patients",
                vec![doc(Some("Ann"), 1), doc(Some(""), 2), doc(None, 3)],
            )
            .await
            .unwrap();

        let empty_or_null = DocumentFilter::FieldIn {
            field: "Name".into(),
            values: vec![FieldValue::Null, FieldValue::Text(String::new())],
        };
        assert_eq!(store.count("patients", &DocumentFilter::All).await.unwrap(), 3);
        assert_eq!(store.count("patients", &empty_or_null).await.unwrap(), 2);
        assert_eq!(
            store
                .count("patients", &DocumentFilter::FieldMissing { field: "Name".into() })
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_group_count_and_delete() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .insert_many(
                "patients",
                vec![doc(Some("Ann"), 1), doc(Some("Ann"), 1), doc(Some("Bo"), 1)],
            )
            .await
            .unwrap();
        store.insert_many("archive", vec![doc(Some("Ann"), 1)]).await.unwrap();

        let fields: Vec<String> = ["Name", "Billing Amount", "Date of Admission"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let groups = store.group_count("patients", &fields, 2).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].key[0], FieldValue::Text("Ann".into()));
        assert_eq!(
            groups[0].key[1],
            FieldValue::Decimal(FixedDecimal::from_hundredths(1))
        );

        assert_eq!(store.delete_all("patients").await.unwrap(), 3);
        assert_eq!(store.count("archive", &DocumentFilter::All).await.unwrap(), 1);
    }

    #[test]
    fn test_open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested");
        SqliteDocumentStore::open(&target, "healthcare").unwrap();
        assert!(target.join("healthcare.db").exists());
    }
}
