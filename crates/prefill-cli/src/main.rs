//! prefill - batch document field extraction with a learned positional cache.
//!
//! Usage:
//!   prefill extract --dataset dataset.json          Process a dataset
//!   prefill extract ... --offline                   Cache-only, no oracle
//!   prefill cache-stats --cache cache.json          Inspect a cache file

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use prefill::{
    CacheSnapshot, ExtractionOracle, OpenAiOracle, Pipeline, PrefillConfig, TextBox, Usage,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "prefill", version, about = "Document field extraction with a learned positional cache")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract fields from every document in a dataset
    Extract {
        /// Dataset description file (JSON)
        #[arg(long)]
        dataset: PathBuf,

        /// Directory that document box files are resolved against
        #[arg(long)]
        boxes_dir: Option<PathBuf>,

        /// Heuristic cache file, loaded if present and saved back after the run
        #[arg(long, default_value = "cache.json")]
        cache: PathBuf,

        /// Where to write per-document results (JSON)
        #[arg(long, default_value = "results.json")]
        output: PathBuf,

        /// Optional config file (TOML or JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Answer from the cache only; unresolved fields stay null
        #[arg(long)]
        offline: bool,
    },

    /// Print summary statistics for a heuristic cache file
    CacheStats {
        /// Heuristic cache file (JSON)
        #[arg(long, default_value = "cache.json")]
        cache: PathBuf,
    },
}

/// One document of a dataset: where its text boxes live, what kind of
/// document it is, and which fields to extract.
#[derive(Debug, Deserialize)]
struct DatasetEntry {
    document: PathBuf,
    label: String,
    extraction_schema: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct DocumentResult {
    document: PathBuf,
    label: String,
    values: BTreeMap<String, Option<String>>,
    prefilled_keys: Vec<String>,
    oracle_keys: Vec<String>,
    latency_seconds: f64,
    input_tokens: u64,
    output_tokens: u64,
    cost_usd: f64,
}

#[derive(Debug, Serialize)]
struct RunReport {
    documents: usize,
    prefilled_fields: usize,
    oracle_fields: usize,
    total_cost_usd: f64,
    results: Vec<DocumentResult>,
}

fn load_dataset(path: &Path) -> Result<Vec<DatasetEntry>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset file {}", path.display()))?;
    let entries: Vec<DatasetEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid dataset file {}", path.display()))?;
    if entries.is_empty() {
        bail!("Dataset {} contains no documents", path.display());
    }
    Ok(entries)
}

fn load_boxes(path: &Path) -> Result<Vec<TextBox>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read box file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid box file {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<PrefillConfig> {
    match path {
        Some(path) => PrefillConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PrefillConfig::default()),
    }
}

fn build_oracle(
    config: &PrefillConfig,
    offline: bool,
) -> Result<Option<Box<dyn ExtractionOracle>>> {
    if offline {
        return Ok(None);
    }
    let oracle_config = config
        .oracle
        .clone()
        .unwrap_or_default();
    let oracle = OpenAiOracle::new(oracle_config)
        .context("Failed to initialize the extraction oracle (use --offline to skip it)")?;
    Ok(Some(Box::new(oracle)))
}

async fn run_extract(
    dataset: &Path,
    boxes_dir: Option<&Path>,
    cache_path: &Path,
    output: &Path,
    config_path: Option<&Path>,
    offline: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let entries = load_dataset(dataset)?;
    let oracle = build_oracle(&config, offline)?;

    let pipeline = if cache_path.exists() {
        let snapshot = CacheSnapshot::load_json_file(cache_path)
            .with_context(|| format!("Failed to load cache {}", cache_path.display()))?;
        Pipeline::with_snapshot(&config, snapshot, oracle)?
    } else {
        Pipeline::new(&config, oracle)?
    };

    let mut results = Vec::with_capacity(entries.len());
    let mut total_usage = Usage::default();
    let mut prefilled_fields = 0;
    let mut oracle_fields = 0;

    for entry in &entries {
        let box_path = match boxes_dir {
            Some(dir) => dir.join(&entry.document),
            None => entry.document.clone(),
        };
        let boxes = load_boxes(&box_path)?;

        let report = pipeline
            .process_document(&entry.label, &entry.extraction_schema, &boxes)
            .await
            .with_context(|| format!("Extraction failed for {}", entry.document.display()))?;

        total_usage.accumulate(report.usage);
        prefilled_fields += report.prefilled_keys.len();
        oracle_fields += report.oracle_keys.len();

        results.push(DocumentResult {
            document: entry.document.clone(),
            label: report.label,
            values: report.values.into_iter().collect(),
            prefilled_keys: report.prefilled_keys,
            oracle_keys: report.oracle_keys,
            latency_seconds: report.latency.as_secs_f64(),
            input_tokens: report.usage.input_tokens,
            output_tokens: report.usage.output_tokens,
            cost_usd: report.usage.cost_usd(),
        });
    }

    let run = RunReport {
        documents: results.len(),
        prefilled_fields,
        oracle_fields,
        total_cost_usd: total_usage.cost_usd(),
        results,
    };

    let rendered = serde_json::to_string_pretty(&run)?;
    fs::write(output, rendered)
        .with_context(|| format!("Failed to write results to {}", output.display()))?;

    pipeline
        .export_cache()
        .save_json_file(cache_path)
        .with_context(|| format!("Failed to save cache to {}", cache_path.display()))?;

    println!(
        "Processed {} documents: {} fields prefilled, {} from oracle (${:.4})",
        run.documents, run.prefilled_fields, run.oracle_fields, run.total_cost_usd
    );
    println!("Results written to {}", output.display());
    Ok(())
}

fn run_cache_stats(cache_path: &Path) -> Result<()> {
    let snapshot = CacheSnapshot::load_json_file(cache_path)
        .with_context(|| format!("Failed to load cache {}", cache_path.display()))?;

    if snapshot.labels.is_empty() {
        println!("Cache {} is empty", cache_path.display());
        return Ok(());
    }

    let mut labels: Vec<_> = snapshot.labels.iter().collect();
    labels.sort_by(|a, b| a.0.cmp(b.0));

    for (label, keys) in labels {
        println!("{label}: {} keys", keys.len());
        let mut keys: Vec<_> = keys.iter().collect();
        keys.sort_by(|a, b| a.0.cmp(b.0));
        for (key, record) in keys {
            let kind = record
                .expected_type
                .map(|k| format!("{k:?}").to_lowercase())
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "  {key}: {} observations, {} heuristics, type {kind}",
                record.observation_count,
                record.heuristics.len()
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Extract {
            dataset,
            boxes_dir,
            cache,
            output,
            config,
            offline,
        } => {
            run_extract(
                &dataset,
                boxes_dir.as_deref(),
                &cache,
                &output,
                config.as_deref(),
                offline,
            )
            .await
        }
        Commands::CacheStats { cache } => run_cache_stats(&cache),
    }
}
