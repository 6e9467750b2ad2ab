//! CLI command definitions for event-stager.
//!
//! This module provides the command-line interface for running the two-stage
//! reduction pipeline and the label consistency filter.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::pipeline::{
    JobTemplates, ParquetEventCounter, ParquetMerger, PipelineConfig, PipelineOrchestrator,
    ProcessCatalog, RunMode,
};
use crate::quality::{
    default_label_fields, filtered_output_path, AuditReport, FilterReport, LabelFilter,
    DEFAULT_AUDIT_CONCURRENCY, DEFAULT_FILTER_CONCURRENCY,
};

/// Default input directory holding the per-sample event files.
const DEFAULT_INPUT_DIR: &str = "/eos/experiment/fcc/ee/generation/DelphesEvents/winter2023/IDEA/";

/// Default output directory for merged artifacts.
const DEFAULT_OUTPUT_DIR: &str = "./output";

/// Default sample.
const DEFAULT_SAMPLE: &str = "wzp6_ee_Hlnuqq_ecm125";

/// Two-stage event reduction and label consistency filtering.
#[derive(Parser)]
#[command(name = "event-stager")]
#[command(about = "Stage, partition and merge event reductions; filter inconsistent labels")]
#[command(version)]
#[command(
    long_about = "event-stager runs a full-dataset stage1 reduction, splits its events into equal ranges for parallel stage2 jobs, merges the partitions and cleans up.\n\nExample usage:\n  event-stager run --sample wzp6_ee_Hbb_ecm125 --ncpus 64 --opt 3\n  event-stager filter output/stage2_Hbb.parquet"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the reduction pipeline for one sample.
    Run(RunArgs),

    /// Keep only events with exactly one label set.
    Filter(FilterArgs),

    /// Report conflicting and unlabeled events without writing anything.
    Audit(AuditArgs),
}

/// Arguments for `event-stager run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding one sub-directory of event files per sample.
    #[arg(long, default_value = DEFAULT_INPUT_DIR)]
    pub indir: PathBuf,

    /// Directory receiving the merged stage2 artifact.
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub outdir: PathBuf,

    /// Sample name, e.g. wzp6_ee_Hbb_ecm125.
    #[arg(long, default_value = DEFAULT_SAMPLE)]
    pub sample: String,

    /// Worker count: stage2 pool size and number of partitions.
    #[arg(short = 'n', long, alias = "workers")]
    pub ncpus: Option<usize>,

    /// Option: 1=run stage 1, 2=run stage 2, 3=all, 4=clean.
    #[arg(long, alias = "mode", default_value = "3", value_parser = parse_mode)]
    pub opt: RunMode,

    /// Working directory for transient artifacts.
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// YAML file overriding the external job templates.
    #[arg(long)]
    pub jobs: Option<PathBuf>,

    /// Artifact file extension.
    #[arg(long)]
    pub ext: Option<String>,

    /// Count and merge Parquet artifacts in-process instead of with external tools.
    #[arg(long)]
    pub in_process: bool,

    /// Output the run report as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `event-stager filter`.
#[derive(Parser, Debug)]
pub struct FilterArgs {
    /// Event files to filter.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Write `<stem>_filtered.<ext>` files here instead of next to the inputs.
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Comma-separated label fields (default: the 18 process_is* fields).
    #[arg(long)]
    pub labels: Option<String>,

    /// Maximum number of files processed at once.
    #[arg(short = 'c', long, default_value_t = DEFAULT_FILTER_CONCURRENCY)]
    pub concurrency: usize,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `event-stager audit`.
#[derive(Parser, Debug)]
pub struct AuditArgs {
    /// Event files to audit.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Comma-separated label fields (default: the 18 process_is* fields).
    #[arg(long)]
    pub labels: Option<String>,

    /// Maximum number of files processed at once.
    #[arg(short = 'c', long, default_value_t = DEFAULT_AUDIT_CONCURRENCY)]
    pub concurrency: usize,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

fn parse_mode(value: &str) -> Result<RunMode, String> {
    value.parse()
}

fn parse_labels(labels: Option<&str>) -> Vec<String> {
    match labels {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        None => default_label_fields(),
    }
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline_command(args).await,
        Commands::Filter(args) => run_filter_command(args).await,
        Commands::Audit(args) => run_audit_command(args).await,
    }
}

// ============================================================================
// Pipeline Command Implementation
// ============================================================================

/// Builds the pipeline configuration: defaults, then environment, then flags.
fn build_config(args: &RunArgs) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::new();
    config.apply_env()?;

    config = config
        .with_input_dir(&args.indir)
        .with_output_dir(&args.outdir)
        .with_mode(args.opt);
    if let Some(workers) = args.ncpus {
        config = config.with_workers(workers);
    }
    if let Some(ref dir) = args.work_dir {
        config = config.with_work_dir(dir);
    }
    if let Some(ref path) = args.jobs {
        config = config.with_job_templates(JobTemplates::from_yaml_file(path)?);
    }
    if let Some(ref ext) = args.ext {
        config = config.with_artifact_extension(ext);
    } else if args.in_process {
        config = config.with_artifact_extension("parquet");
    }

    config.validate()?;
    Ok(config)
}

async fn run_pipeline_command(args: RunArgs) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    let catalog = Arc::new(ProcessCatalog::default());

    let mut orchestrator = PipelineOrchestrator::new(config, catalog)?;
    if args.in_process {
        orchestrator = orchestrator
            .with_merger(Arc::new(ParquetMerger))
            .with_counter(Arc::new(ParquetEventCounter));
    }

    let report = orchestrator.run(&args.sample).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if let Some(line) = report.summary_line() {
        println!("{}", line);
    } else {
        println!("Run {} finished ({})", report.run_id, report.mode);
    }
    Ok(())
}

// ============================================================================
// Filter Command Implementation
// ============================================================================

#[derive(Debug, Serialize)]
struct BatchSummary<'a, T: Serialize> {
    files: usize,
    succeeded: u64,
    failed: u64,
    reports: &'a [T],
}

async fn run_filter_command(args: FilterArgs) -> anyhow::Result<()> {
    let labels = parse_labels(args.labels.as_deref());
    let filter = LabelFilter::new(labels, args.concurrency)?;

    let files: Vec<(PathBuf, PathBuf)> = args
        .inputs
        .iter()
        .map(|input| {
            let output = filtered_output_path(input, args.output_dir.as_deref());
            (input.clone(), output)
        })
        .collect();

    info!(files = files.len(), concurrency = args.concurrency, "Filtering files in parallel");
    let reports: Vec<FilterReport> = filter.filter_files(files).await;
    print_batch(&reports, filter.stats().succeeded, filter.stats().failed, args.json)
}

async fn run_audit_command(args: AuditArgs) -> anyhow::Result<()> {
    let labels = parse_labels(args.labels.as_deref());
    let filter = LabelFilter::new(labels, args.concurrency)?;

    info!(files = args.inputs.len(), concurrency = args.concurrency, "Checking files in parallel");
    let reports: Vec<AuditReport> = filter.audit_files(args.inputs).await;
    print_batch(&reports, filter.stats().succeeded, filter.stats().failed, args.json)
}

fn print_batch<T>(reports: &[T], succeeded: u64, failed: u64, json: bool) -> anyhow::Result<()>
where
    T: Serialize + std::fmt::Display,
{
    if json {
        let summary = BatchSummary {
            files: reports.len(),
            succeeded,
            failed,
            reports,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for report in reports {
            println!("{}", report);
        }
    }
    Ok(())
}
