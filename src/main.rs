use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use healthcare_etl::pipeline::{
    CleanSummary, IntegrityReport, LoadSummary, Pipeline, VerifyMode, VerifyOptions,
};
use healthcare_etl::{config, logging, storage, Config};

#[derive(Parser)]
#[command(name = "healthcare_etl")]
#[command(about = "Clean, load and verify a healthcare admissions dataset")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that take precedence over the config file and environment.
#[derive(Args)]
struct Overrides {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raw source CSV
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Cleaned CSV artifact
    #[arg(long, global = true)]
    cleaned: Option<PathBuf>,

    /// Document store endpoint (memory:// or sqlite://<dir>)
    #[arg(long, global = true)]
    store_uri: Option<String>,

    #[arg(long, global = true)]
    database: Option<String>,

    #[arg(long, global = true)]
    collection: Option<String>,
}

#[derive(Args, Clone, Copy)]
struct VerifyArgs {
    /// Run every check instead of stopping at the first failure
    #[arg(long)]
    collect_all: bool,

    /// Look for missing fields in every document, not just one sample
    #[arg(long)]
    full_scan: bool,
}

impl From<VerifyArgs> for VerifyOptions {
    fn from(args: VerifyArgs) -> Self {
        VerifyOptions {
            mode: if args.collect_all {
                VerifyMode::CollectAll
            } else {
                VerifyMode::FailFast
            },
            full_scan: args.full_scan,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize and deduplicate the source CSV into the cleaned artifact
    Clean,
    /// Replace the collection with the contents of the cleaned artifact
    Load,
    /// Run the integrity checks against the loaded collection
    Verify {
        #[command(flatten)]
        args: VerifyArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clean, load and verify in one go
    Run {
        #[command(flatten)]
        args: VerifyArgs,
    },
}

fn load_config(overrides: &Overrides) -> Result<Config> {
    let mut config = Config::layered(overrides.config.as_deref(), |key| std::env::var(key).ok())
        .context("Failed to load configuration")?;

    config.apply_overrides(config::Overrides {
        source_path: overrides.source.clone(),
        cleaned_path: overrides.cleaned.clone(),
        store_uri: overrides.store_uri.clone(),
        database: overrides.database.clone(),
        collection: overrides.collection.clone(),
    });

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_clean(summary: &CleanSummary) {
    println!("\n📊 Clean results for {}:", summary.source.display());
    println!("   Rows read: {}", summary.rows_read);
    println!("   Normalized: {}", summary.normalized);
    println!("   Skipped: {}", summary.skipped.len());
    println!("   Duplicates removed: {}", summary.duplicates);
    match &summary.artifact {
        Some(artifact) => {
            println!("   Output file: {}", artifact.path.display());
            println!("   Rows written: {}", artifact.rows);
            println!("   SHA-256: {}", artifact.sha256);
        }
        None => println!("⚠️  No records survived; nothing was written"),
    }

    if !summary.skipped.is_empty() {
        println!("\n⚠️  Skipped rows:");
        for skip in &summary.skipped {
            println!("   - line {}: {}", skip.line, skip.reason);
        }
    }
}

fn print_load(summary: &LoadSummary) {
    println!("\n📊 Load results for {}/{}:", summary.endpoint, summary.collection);
    println!("   Rows read: {}", summary.rows_read);
    println!("   Deleted: {}", summary.deleted);
    println!("   Inserted: {}", summary.inserted);
    println!("   Skipped: {}", summary.skipped.len());

    if !summary.skipped.is_empty() {
        println!("\n⚠️  Skipped rows:");
        for skip in &summary.skipped {
            println!("   - line {}: {}", skip.line, skip.reason);
        }
    }
}

fn print_report(report: &IntegrityReport) {
    println!("\n🔍 Integrity checks for {}:", report.collection);
    for result in &report.results {
        let mark = if result.passed { "✅" } else { "❌" };
        println!("   {} {}", mark, result);
    }
    if report.passed() {
        println!("✅ All integrity checks passed");
    } else {
        println!("❌ Integrity verification failed");
    }
}

/// Runs one subcommand. `Ok(false)` means the command ran but left nothing to
/// load; a failing integrity check comes back as an error.
async fn execute(cli: Cli) -> Result<bool> {
    let config = load_config(&cli.overrides)?;
    let pipeline = Pipeline::new(config);
    info!("Run id {}", pipeline.run_id());

    match cli.command {
        Commands::Clean => {
            println!("🧹 Running clean stage...");
            let summary = pipeline.clean()?;
            print_clean(&summary);
            Ok(summary.artifact.is_some())
        }
        Commands::Load => {
            println!("📥 Running load stage...");
            let store = storage::connect(pipeline.config()).await?;
            let summary = pipeline.load(store.as_ref()).await?;
            print_load(&summary);
            Ok(true)
        }
        Commands::Verify { args, json } => {
            let store = storage::connect(pipeline.config()).await?;
            let report = pipeline.verify(store.as_ref(), args.into()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            report.into_result()?;
            Ok(true)
        }
        Commands::Run { args } => {
            println!("🚀 Running full pipeline...");
            let store = storage::connect(pipeline.config()).await?;
            let summary = pipeline.run(store.as_ref(), args.into()).await?;

            print_clean(&summary.clean);
            if let Some(load) = &summary.load {
                print_load(load);
            }
            if let Some(report) = &summary.integrity {
                print_report(report);
            }
            let succeeded = summary.succeeded();
            if let Some(report) = summary.integrity {
                report.into_result()?;
            }
            Ok(succeeded)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Pipeline failed: {:#}", e);
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}
