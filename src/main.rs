use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use rec_quality::app::classify_use_case::{ClassifyUseCase, RunReport};
use rec_quality::config::Config;
use rec_quality::infra::{
    FileOverrideSource, FileRecordSource, FileReviewBatchAdapter, FileScoredOutputAdapter,
};
use rec_quality::pipeline::{Pipeline, ReviewExporter};
use rec_quality::{logging, observability};

#[derive(Parser)]
#[command(name = "rec_quality")]
#[command(about = "Deterministic quality gate for recommendation records")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every record of an input file
    Classify {
        /// Input file (.csv, .json, .jsonl)
        #[arg(long)]
        input: PathBuf,
        /// Output file; .csv writes CSV, anything else JSONL
        #[arg(long)]
        output: PathBuf,
        /// Config file (.toml or .json); falls back to REC_QUALITY_CONFIG, then defaults
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write ambiguous or low-confidence records here for external review (JSONL)
        #[arg(long)]
        review_batch: Option<PathBuf>,
        /// Merge reviewer overrides from this file before writing output
        #[arg(long)]
        overrides: Option<PathBuf>,
        /// Write Prometheus metrics text here when the run finishes
        #[arg(long)]
        metrics_out: Option<PathBuf>,
    },
    /// Validate a config file and print its fingerprint
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Classify {
            input,
            output,
            config,
            review_batch,
            overrides,
            metrics_out,
        } => {
            if let Err(e) = observability::init() {
                error!("Failed to initialize metrics: {}", e);
            }

            let config = Config::resolve(config.as_deref()).context("Invalid configuration")?;
            let pipeline = Pipeline::from_config(&config).context("Failed to build pipeline")?;
            let source = FileRecordSource::new(&input, config.fields.id_field.clone())
                .with_context(|| format!("Unsupported input file {}", input.display()))?;

            let mut use_case = ClassifyUseCase::new(
                pipeline,
                ReviewExporter::from_config(&config.review),
                Box::new(source),
                Box::new(FileScoredOutputAdapter::new(&output)),
            );
            if let Some(path) = &review_batch {
                let adapter = FileReviewBatchAdapter::new(&path.to_string_lossy())
                    .with_context(|| format!("Failed to create review batch {}", path.display()))?;
                use_case = use_case.with_review_batch(Box::new(adapter));
            }
            if let Some(path) = &overrides {
                use_case = use_case.with_overrides(Box::new(FileOverrideSource::new(path)));
            }

            let report = use_case.run().await?;
            print_summary(&report);

            if let Some(path) = metrics_out {
                let text = observability::render().unwrap_or_default();
                std::fs::write(&path, text)
                    .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
                info!(path = %path.display(), "Wrote metrics");
            }
        }
        Commands::CheckConfig { config } => {
            let config = Config::resolve(config.as_deref()).context("Invalid configuration")?;
            println!("Configuration OK");
            println!("   Fingerprint: {}", config.fingerprint());
        }
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("Wrote {} rows to {}", report.rows_written, report.output);
    for (decision, count) in &report.decisions {
        println!("   {}: {}", decision, count);
    }
    println!("   Duplicates: {}", report.duplicates);
    if !report.skipped.is_empty() {
        println!("   Skipped rows: {}", report.skipped.len());
        for skipped in &report.skipped {
            println!("   - line {}: {}", skipped.line, skipped.reason);
        }
    }
    if let Some(path) = &report.review_batch {
        println!("Wrote {} review items to {}", report.exported, path);
    }
    if let Some(merge) = &report.merge {
        println!(
            "Merged overrides: {} applied, {} unchanged, {} rejected",
            merge.applied,
            merge.unchanged,
            merge.rejected.len()
        );
        for rejection in &merge.rejected {
            println!("   - {}: {}", rejection.subject(), rejection.reason);
        }
    }
    println!("   Run id: {}", report.run_id);
}
