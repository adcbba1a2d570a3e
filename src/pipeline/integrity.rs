//! Post-load verification of the destination collection.
//!
//! Four checks run in a fixed order. Each produces a [`CheckResult`]; the
//! checker never modifies the collection.

use std::fmt;

use serde::Serialize;
use tracing::{error, info, instrument};

use crate::error::{PipelineError, Result};
use crate::record::Field;
use crate::storage::{DocumentFilter, DocumentGroup, DocumentStore, FieldValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityCheck {
    NonEmptyCollection,
    SchemaPresence,
    NameNotEmpty,
    NoDuplicates,
}

impl IntegrityCheck {
    pub const ALL: [IntegrityCheck; 4] = [
        IntegrityCheck::NonEmptyCollection,
        IntegrityCheck::SchemaPresence,
        IntegrityCheck::NameNotEmpty,
        IntegrityCheck::NoDuplicates,
    ];

    /// 1-based position in the check order.
    pub fn number(self) -> usize {
        self as usize + 1
    }

    pub fn label(self) -> &'static str {
        match self {
            IntegrityCheck::NonEmptyCollection => "non-empty collection",
            IntegrityCheck::SchemaPresence => "schema presence",
            IntegrityCheck::NameNotEmpty => "name not empty",
            IntegrityCheck::NoDuplicates => "no duplicate documents",
        }
    }
}

/// Whether verification stops at the first failing check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    #[default]
    FailFast,
    CollectAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingField {
    pub field: String,
    /// Number of documents lacking the field; only known in full-scan mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<u64>,
}

/// What a check observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    DocumentCount { count: u64 },
    NoSampleDocument,
    FieldsPresent { expected: usize },
    MissingFields { fields: Vec<MissingField> },
    EmptyNames { documents: u64 },
    DuplicateGroups { groups: Vec<DocumentGroup> },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::DocumentCount { count } => write!(f, "{count} documents"),
            Finding::NoSampleDocument => write!(f, "no document to sample"),
            Finding::FieldsPresent { expected } => {
                write!(f, "all {expected} expected fields present")
            }
            Finding::MissingFields { fields } => {
                let names: Vec<String> = fields
                    .iter()
                    .map(|m| match m.documents {
                        Some(n) => format!("{} ({} documents)", m.field, n),
                        None => m.field.clone(),
                    })
                    .collect();
                write!(f, "missing fields: {}", names.join(", "))
            }
            Finding::EmptyNames { documents } => {
                write!(f, "{documents} documents with a null or empty Name")
            }
            Finding::DuplicateGroups { groups } if groups.is_empty() => {
                write!(f, "no duplicate groups")
            }
            Finding::DuplicateGroups { groups } => {
                let documents: u64 = groups.iter().map(|g| g.count).sum();
                write!(
                    f,
                    "{} duplicate groups covering {} documents",
                    groups.len(),
                    documents
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub check: IntegrityCheck,
    pub passed: bool,
    pub finding: Finding,
}

impl CheckResult {
    fn new(check: IntegrityCheck, passed: bool, finding: Finding) -> Self {
        Self {
            check,
            passed,
            finding,
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "check {} ({}) {}: {}",
            self.check.number(),
            self.check.label(),
            if self.passed { "PASS" } else { "FAIL" },
            self.finding
        )
    }
}

/// Ordered results of one verification pass.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub collection: String,
    pub expected_fields: Vec<String>,
    pub mode: VerifyMode,
    pub full_scan: bool,
    pub results: Vec<CheckResult>,
}

impl IntegrityReport {
    pub fn passed(&self) -> bool {
        self.results.len() == IntegrityCheck::ALL.len() && self.results.iter().all(|r| r.passed)
    }

    pub fn first_failure(&self) -> Option<&CheckResult> {
        self.results.iter().find(|r| !r.passed)
    }

    /// Turns the first failing check into an [`PipelineError::IntegrityViolation`].
    pub fn into_result(self) -> Result<Self> {
        match self.first_failure() {
            Some(failure) => Err(PipelineError::IntegrityViolation(Box::new(failure.clone()))),
            None => Ok(self),
        }
    }
}

pub struct IntegrityChecker<'a> {
    store: &'a dyn DocumentStore,
    collection: &'a str,
    expected_fields: Vec<String>,
    mode: VerifyMode,
    full_scan: bool,
}

impl<'a> IntegrityChecker<'a> {
    /// `expected_fields` is the header row of the cleaned artifact.
    pub fn new(store: &'a dyn DocumentStore, collection: &'a str, expected_fields: Vec<String>) -> Self {
        Self {
            store,
            collection,
            expected_fields,
            mode: VerifyMode::default(),
            full_scan: false,
        }
    }

    pub fn with_mode(mut self, mode: VerifyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Check every document for the expected fields instead of one sample.
    pub fn with_full_scan(mut self, full_scan: bool) -> Self {
        self.full_scan = full_scan;
        self
    }

    /// Runs the checks in order. Store failures are errors; failing checks
    /// are not, they are reported in the returned [`IntegrityReport`].
    #[instrument(skip(self), fields(collection = %self.collection, mode = ?self.mode))]
    pub async fn run(&self) -> Result<IntegrityReport> {
        let mut results = Vec::with_capacity(IntegrityCheck::ALL.len());

        for check in IntegrityCheck::ALL {
            let result = self.run_check(check).await?;
            if result.passed {
                info!("✅ {}", result);
            } else {
                error!("❌ {}", result);
            }

            let stop = !result.passed && self.mode == VerifyMode::FailFast;
            results.push(result);
            if stop {
                break;
            }
        }

        Ok(IntegrityReport {
            collection: self.collection.to_string(),
            expected_fields: self.expected_fields.clone(),
            mode: self.mode,
            full_scan: self.full_scan,
            results,
        })
    }

    async fn run_check(&self, check: IntegrityCheck) -> Result<CheckResult> {
        match check {
            IntegrityCheck::NonEmptyCollection => {
                let count = self.store.count(self.collection, &DocumentFilter::All).await?;
                Ok(CheckResult::new(check, count > 0, Finding::DocumentCount { count }))
            }
            IntegrityCheck::SchemaPresence => self.check_schema().await,
            IntegrityCheck::NameNotEmpty => {
                let filter = DocumentFilter::FieldIn {
                    field: Field::Name.header().to_string(),
                    values: vec![FieldValue::Null, FieldValue::Text(String::new())],
                };
                let documents = self.store.count(self.collection, &filter).await?;
                Ok(CheckResult::new(check, documents == 0, Finding::EmptyNames { documents }))
            }
            IntegrityCheck::NoDuplicates => {
                let groups = self
                    .store
                    .group_count(self.collection, &self.expected_fields, 2)
                    .await?;
                Ok(CheckResult::new(
                    check,
                    groups.is_empty(),
                    Finding::DuplicateGroups { groups },
                ))
            }
        }
    }

    async fn check_schema(&self) -> Result<CheckResult> {
        let check = IntegrityCheck::SchemaPresence;
        let Some(sample) = self.store.find_one(self.collection).await? else {
            return Ok(CheckResult::new(check, false, Finding::NoSampleDocument));
        };

        let mut missing = Vec::new();
        if self.full_scan {
            for field in &self.expected_fields {
                let filter = DocumentFilter::FieldMissing {
                    field: field.clone(),
                };
                let documents = self.store.count(self.collection, &filter).await?;
                if documents > 0 {
                    missing.push(MissingField {
                        field: field.clone(),
                        documents: Some(documents),
                    });
                }
            }
        } else {
            missing.extend(
                self.expected_fields
                    .iter()
                    .filter(|f| !sample.contains_key(f))
                    .map(|f| MissingField {
                        field: f.clone(),
                        documents: None,
                    }),
            );
        }

        Ok(if missing.is_empty() {
            CheckResult::new(
                check,
                true,
                Finding::FieldsPresent {
                    expected: self.expected_fields.len(),
                },
            )
        } else {
            CheckResult::new(check, false, Finding::MissingFields { fields: missing })
        })
    }
}
