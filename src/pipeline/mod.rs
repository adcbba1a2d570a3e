//! The ETL stages: normalize and deduplicate into the cleaned artifact, load
//! it into the document store, then verify the collection.

pub mod artifact;
pub mod dedupe;
pub mod integrity;
pub mod load;
pub mod normalize;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::record::RawRecord;
use crate::storage::DocumentStore;

pub use artifact::ArtifactInfo;
pub use dedupe::Deduplicator;
pub use integrity::{CheckResult, IntegrityCheck, IntegrityChecker, IntegrityReport, VerifyMode};
pub use load::{LoadSummary, Loader};

/// A record dropped by a stage, with the line it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub line: u64,
    pub reason: String,
}

/// Result of the normalize and deduplicate stage.
#[derive(Debug, Clone, Serialize)]
pub struct CleanSummary {
    pub source: PathBuf,
    pub rows_read: usize,
    pub normalized: usize,
    pub skipped: Vec<SkippedRecord>,
    pub duplicates: usize,
    /// `None` when no record survived and nothing was written.
    pub artifact: Option<ArtifactInfo>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    pub mode: VerifyMode,
    pub full_scan: bool,
}

/// Result of a full run. Later stages are `None` when an earlier one left
/// nothing for them to do.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub clean: CleanSummary,
    pub load: Option<LoadSummary>,
    pub integrity: Option<IntegrityReport>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.integrity.as_ref().is_some_and(IntegrityReport::passed)
    }
}

pub struct Pipeline {
    config: Config,
    run_id: Uuid,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Normalizes every source row, drops exact duplicates and writes the
    /// cleaned artifact.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub fn clean(&self) -> Result<CleanSummary> {
        let started = Instant::now();
        let source = &self.config.source_path;
        info!("🧹 Normalizing {}", source.display());

        let mut input = artifact::CsvInput::open(source)?;
        let mut dedup = Deduplicator::new();
        let mut kept = Vec::new();
        let mut rows_read = 0;
        let mut normalized = 0;
        let mut skipped = Vec::new();

        while let Some(row) = input.next_row()? {
            rows_read += 1;
            let outcome = row
                .values
                .and_then(|values| normalize::normalize_record(&RawRecord::new(input.header(), values)));
            match outcome {
                Ok(record) => {
                    normalized += 1;
                    kept.extend(dedup.admit(record));
                }
                Err(reason) => {
                    warn!("Skipping row {}: {}", row.line, reason);
                    skipped.push(SkippedRecord {
                        line: row.line,
                        reason: reason.to_string(),
                    });
                }
            }
        }

        counter!("healthcare_records_normalized_total").increment(normalized as u64);
        counter!("healthcare_records_skipped_total").increment(skipped.len() as u64);
        counter!("healthcare_records_duplicates_total").increment(dedup.suppressed() as u64);

        info!(
            "✅ Normalized {} of {} rows ({} skipped, {} duplicates removed)",
            normalized,
            rows_read,
            skipped.len(),
            dedup.suppressed()
        );

        let artifact = if kept.is_empty() {
            warn!(
                "No records survived normalization; {} was not written",
                self.config.cleaned_path.display()
            );
            // a previous artifact would otherwise be reloaded by a later `load`
            match fs::remove_file(&self.config.cleaned_path) {
                Ok(()) => warn!("Removed stale {}", self.config.cleaned_path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            None
        } else {
            let info = artifact::write_cleaned(&self.config.cleaned_path, input.header(), &kept)?;
            info!("💾 Wrote {} rows to {}", info.rows, info.path.display());
            Some(info)
        };

        histogram!("healthcare_stage_duration_seconds", "stage" => "clean")
            .record(started.elapsed().as_secs_f64());

        Ok(CleanSummary {
            source: source.clone(),
            rows_read,
            normalized,
            skipped,
            duplicates: dedup.suppressed(),
            artifact,
        })
    }

    /// Replaces the configured collection with the cleaned artifact.
    #[instrument(skip(self, store), fields(run_id = %self.run_id, endpoint = %store.describe()))]
    pub async fn load(&self, store: &dyn DocumentStore) -> Result<LoadSummary> {
        let started = Instant::now();
        info!("📥 Loading {}", self.config.cleaned_path.display());
        let summary = Loader::new(store, &self.config.collection, self.config.max_bulk_insert)
            .load_file(&self.config.cleaned_path)
            .await?;
        histogram!("healthcare_stage_duration_seconds", "stage" => "load")
            .record(started.elapsed().as_secs_f64());
        Ok(summary)
    }

    /// Verifies the collection against the cleaned artifact's header.
    #[instrument(skip(self, store), fields(run_id = %self.run_id))]
    pub async fn verify(
        &self,
        store: &dyn DocumentStore,
        options: VerifyOptions,
    ) -> Result<IntegrityReport> {
        let started = Instant::now();
        let expected_fields = artifact::read_header_names(&self.config.cleaned_path)?;
        info!(
            "🔍 Verifying {} against {} expected fields",
            self.config.collection,
            expected_fields.len()
        );
        let report = IntegrityChecker::new(store, &self.config.collection, expected_fields)
            .with_mode(options.mode)
            .with_full_scan(options.full_scan)
            .run()
            .await?;
        histogram!("healthcare_stage_duration_seconds", "stage" => "verify")
            .record(started.elapsed().as_secs_f64());
        Ok(report)
    }

    /// Clean, load and verify in sequence. Stops after cleaning when no
    /// artifact was written.
    #[instrument(skip(self, store), fields(run_id = %self.run_id))]
    pub async fn run(&self, store: &dyn DocumentStore, options: VerifyOptions) -> Result<RunSummary> {
        info!("🚀 Starting pipeline run {}", self.run_id);
        counter!("healthcare_pipeline_runs_total").increment(1);

        let clean = self.clean()?;
        if clean.artifact.is_none() {
            return Ok(RunSummary {
                run_id: self.run_id,
                clean,
                load: None,
                integrity: None,
            });
        }

        let load = self.load(store).await?;
        let integrity = self.verify(store, options).await?;
        Ok(RunSummary {
            run_id: self.run_id,
            clean,
            load: Some(load),
            integrity: Some(integrity),
        })
    }
}
