//! CLI command definitions for codelm-forge.
//!
//! Each subcommand reads JSONL, runs one library stage, and writes the
//! result. Shared numeric settings come from [`PrepConfig`]; flags given on
//! the command line win over the environment and the config file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::augment::{
    augment_records, AugmentOptions, ChatParaphraser, DEFAULT_BASE_URL,
    DEFAULT_MODEL as DEFAULT_PARAPHRASE_MODEL,
};
use crate::config::PrepConfig;
use crate::encoding::{BatchEncoder, SequenceAssembler, SignatureExtractor, Variant, VocabRemap};
use crate::export::{write_batch, ColumnSummary, ExportFormat};
use crate::filter::DiversityFilterBuilder;
use crate::records::{group_by_task, read_jsonl, write_jsonl, GenerationSample, Record};
use crate::tokenizer::{HfTokenizerAdapter, SpecialTokenIds, TokenizerAdapter};

/// Training-data preparation for code language models.
#[derive(Parser)]
#[command(name = "codelm-forge")]
#[command(about = "Prepare code/docstring training data and filter sampled generations")]
#[command(version)]
#[command(
    long_about = "codelm-forge turns (docstring, signature, code) records into prefix-LM training sequences and filters sampled code generations for diversity.\n\nExample usage:\n  codelm-forge encode -i train.jsonl -o train.parquet -t tokenizer.json --variant signature-aware"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Encode records into prefix-LM training columns.
    #[command(alias = "enc")]
    Encode(EncodeArgs),

    /// Keep the most diverse generations of each task.
    Filter(FilterArgs),

    /// Fill empty signatures by extracting the def/class header from code.
    ExtractSignatures(ExtractSignaturesArgs),

    /// Add paraphrased-docstring copies of records.
    Augment(AugmentArgs),
}

/// Segment layout accepted by `--variant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum VariantArg {
    Simple,
    SignatureAware,
}

impl From<VariantArg> for Variant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Simple => Variant::Simple,
            VariantArg::SignatureAware => Variant::SignatureAware,
        }
    }
}

/// Output format accepted by `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FormatArg {
    Parquet,
    Jsonl,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Parquet => ExportFormat::Parquet,
            FormatArg::Jsonl => ExportFormat::Jsonl,
        }
    }
}

/// Arguments for `codelm-forge encode`.
#[derive(Parser, Debug)]
pub struct EncodeArgs {
    /// Input JSONL of records.
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Output file.
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// HuggingFace `tokenizer.json`.
    #[arg(short = 't', long)]
    pub tokenizer: PathBuf,

    /// Segment layout.
    #[arg(long, value_enum, default_value = "simple")]
    pub variant: VariantArg,

    /// Maximum sequence length (overrides config).
    #[arg(long)]
    pub max_seq_length: Option<usize>,

    /// JSON token id remapping (overrides config).
    #[arg(long)]
    pub id_map: Option<PathBuf>,

    /// Output format.
    #[arg(short = 'f', long, value_enum, default_value = "parquet")]
    pub format: FormatArg,

    /// Encode each chunk on the rayon pool.
    #[arg(long)]
    pub parallel: bool,

    /// Records per chunk (overrides config).
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `codelm-forge filter`.
#[derive(Parser, Debug)]
pub struct FilterArgs {
    /// Input JSONL of generations (`task_id`, `generation`).
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Output JSONL of kept generations.
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Generations kept per task (overrides config).
    #[arg(short = 'k', long)]
    pub keep: Option<usize>,

    /// Agreement threshold ratio (overrides config).
    #[arg(long)]
    pub threshold_ratio: Option<f64>,

    /// Distance worker threads (overrides config).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `codelm-forge extract-signatures`.
#[derive(Parser, Debug)]
pub struct ExtractSignaturesArgs {
    /// Input JSONL of records.
    #[arg(long)]
    pub infile: PathBuf,

    /// Output JSONL of records.
    #[arg(long)]
    pub outfile: PathBuf,

    /// Print a few extracted signatures.
    #[arg(long)]
    pub show_examples: bool,

    /// Number of examples to print.
    #[arg(long, default_value = "5")]
    pub max_examples: usize,
}

/// Arguments for `codelm-forge augment`.
#[derive(Parser, Debug)]
pub struct AugmentArgs {
    /// Input JSONL of records.
    #[arg(long)]
    pub input_file: PathBuf,

    /// Output JSONL of records.
    #[arg(long)]
    pub output_file: PathBuf,

    /// API key (can also be set via OPENROUTER_API_KEY env var).
    #[arg(long, env = "OPENROUTER_API_KEY")]
    pub api_key: Option<String>,

    /// OpenAI-compatible API base URL.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Paraphrasing model.
    #[arg(short = 'm', long, default_value = DEFAULT_PARAPHRASE_MODEL)]
    pub model: String,

    /// Only process the first N records.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Paraphrase requests in flight at once.
    #[arg(long, default_value = "4")]
    pub concurrency: usize,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and
/// `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Encode(args) => run_encode_command(args, config)?,
        Commands::Filter(args) => run_filter_command(args, config)?,
        Commands::ExtractSignatures(args) => run_extract_signatures_command(args)?,
        Commands::Augment(args) => run_augment_command(args).await?,
    }
    Ok(())
}

// ============================================================================
// Encode
// ============================================================================

#[derive(Debug, Serialize)]
struct EncodeSummary {
    input: String,
    output: String,
    variant: String,
    records: usize,
    dropped: usize,
    #[serde(flatten)]
    columns: ColumnSummary,
}

fn encode_config(args: &EncodeArgs, config_path: Option<&Path>) -> anyhow::Result<PrepConfig> {
    let mut config = PrepConfig::load(config_path)?;
    if let Some(max) = args.max_seq_length {
        config = config.with_max_seq_length(max);
    }
    if let Some(path) = &args.id_map {
        config = config.with_new_id_map(path.clone());
    }
    if let Some(size) = args.chunk_size {
        config = config.with_chunk_size(size);
    }
    config.validate()?;
    Ok(config)
}

fn run_encode_command(args: EncodeArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = encode_config(&args, config_path)?;
    let variant = Variant::from(args.variant);

    let tokenizer: Arc<dyn TokenizerAdapter> = Arc::new(
        HfTokenizerAdapter::from_file(&args.tokenizer)
            .with_context(|| format!("loading tokenizer {}", args.tokenizer.display()))?,
    );
    let special = SpecialTokenIds::resolve(tokenizer.as_ref(), &config.special_tokens)?;

    let remap = match &config.new_id_map {
        Some(path) => Some(Arc::new(
            VocabRemap::from_json_file(path)
                .with_context(|| format!("loading id map {}", path.display()))?,
        )),
        None => None,
    };

    let records: Vec<Record> = read_jsonl(&args.input)?;
    info!(
        input = %args.input.display(),
        records = records.len(),
        variant = %variant,
        max_seq_length = config.max_seq_length,
        "Encoding records"
    );

    let assembler =
        SequenceAssembler::new(tokenizer, special, config.max_seq_length).with_remap(remap);
    let encoder = BatchEncoder::new(assembler, variant);
    let output = encoder.encode_chunked(&records, config.chunk_size, args.parallel)?;

    write_batch(&args.output, &output, args.format.into())?;

    let summary = EncodeSummary {
        input: args.input.display().to_string(),
        output: args.output.display().to_string(),
        variant: variant.to_string(),
        records: records.len(),
        dropped: output.dropped.len(),
        columns: ColumnSummary::from_columns(&output.columns),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Encoded {} of {} records into {} ({} dropped, mean length {:.1})",
            summary.columns.rows,
            summary.records,
            summary.output,
            summary.dropped,
            summary.columns.mean_length
        );
    }
    Ok(())
}

// ============================================================================
// Filter
// ============================================================================

#[derive(Debug, Serialize)]
struct FilterSummary {
    tasks: usize,
    tasks_filtered: usize,
    generations_before: usize,
    generations_kept: usize,
    keep: usize,
    threshold_ratio: f64,
    workers: usize,
}

fn filter_config(args: &FilterArgs, config_path: Option<&Path>) -> anyhow::Result<PrepConfig> {
    let mut config = PrepConfig::load(config_path)?;
    if let Some(keep) = args.keep {
        config = config.with_keep(keep);
    }
    if let Some(ratio) = args.threshold_ratio {
        config = config.with_threshold_ratio(ratio);
    }
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }
    config.validate()?;
    Ok(config)
}

fn run_filter_command(args: FilterArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = filter_config(&args, config_path)?;

    let mut builder = DiversityFilterBuilder::new()
        .keep(config.keep)
        .threshold_ratio(config.threshold_ratio);
    if let Some(workers) = config.workers {
        builder = builder.workers(workers);
    }
    let filter = builder.build()?;

    let samples: Vec<GenerationSample> = read_jsonl(&args.input)?;
    let generations_before = samples.len();
    let groups = group_by_task(samples);
    info!(
        input = %args.input.display(),
        generations = generations_before,
        tasks = groups.len(),
        keep = filter.keep(),
        workers = filter.workers(),
        "Filtering generations"
    );

    let outcomes = filter.filter_all(groups)?;
    let tasks_filtered = outcomes.iter().filter(|o| o.was_filtered()).count();
    let tasks = outcomes.len();
    let kept: Vec<GenerationSample> = outcomes.into_iter().flat_map(|o| o.kept).collect();
    write_jsonl(&args.output, &kept)?;

    let summary = FilterSummary {
        tasks,
        tasks_filtered,
        generations_before,
        generations_kept: kept.len(),
        keep: filter.keep(),
        threshold_ratio: filter.threshold_ratio(),
        workers: filter.workers(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Kept {} of {} generations across {} tasks ({} filtered)",
            summary.generations_kept, summary.generations_before, summary.tasks, summary.tasks_filtered
        );
    }
    Ok(())
}

// ============================================================================
// Signature extraction
// ============================================================================

fn run_extract_signatures_command(args: ExtractSignaturesArgs) -> anyhow::Result<()> {
    let mut records: Vec<Record> = read_jsonl(&args.infile)?;
    let extractor = SignatureExtractor::new(args.max_examples);
    let report = extractor.extract_all(&mut records);
    write_jsonl(&args.outfile, &records)?;

    println!(
        "Extracted {} signatures from {} records",
        report.extracted, report.total
    );
    if args.show_examples {
        for example in &report.examples {
            println!("\n--- {} ---", example.id);
            println!("Signature: {}", example.signature);
            println!("Code: {}...", example.code_prefix);
        }
    }
    Ok(())
}

// ============================================================================
// Augmentation
// ============================================================================

async fn run_augment_command(args: AugmentArgs) -> anyhow::Result<()> {
    let paraphraser = ChatParaphraser::with_endpoint(
        args.api_key.clone().unwrap_or_default(),
        args.base_url.clone(),
        args.model.clone(),
    )?;

    let records: Vec<Record> = read_jsonl(&args.input_file)?;
    info!(
        input = %args.input_file.display(),
        records = records.len(),
        model = paraphraser.model(),
        "Augmenting docstrings"
    );

    let options = AugmentOptions {
        limit: args.limit,
        concurrency: args.concurrency,
    };
    let output = augment_records(records, &paraphraser, options).await;
    write_jsonl(&args.output_file, &output.records)?;

    println!(
        "Wrote {} records to {} ({} augmented, {} without docstring, {} failed)",
        output.records.len(),
        args.output_file.display(),
        output.augmented,
        output.skipped_empty,
        output.failed
    );
    Ok(())
}
