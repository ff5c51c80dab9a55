//! dbtgen: transform generated dbt base models
//!
//! # Usage
//!
//! ```bash
//! # Apply a transforms file to every model in a directory
//! dbtgen transform -m models/base -t transforms.yml -o models/staging
//!
//! # BigQuery heuristics, keeping metadata columns
//! dbtgen bq-transform -m models/base -o models/staging --id-as-int true --drop-metadata false
//!
//! # Inspect what the extractor sees
//! dbtgen columns models/base/accounts.sql
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use colored::*;
use dbtgen::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbtgen")]
#[command(version)]
#[command(about = "Transform generated dbt base models", long_about = None)]
#[command(after_help = "EXAMPLES:
    dbtgen transform -m models/base -t transforms.yml -o models/staging
    dbtgen transforms -m models/base/accounts.sql -t transforms.yml -o models/staging
    dbtgen sf-transform -m models/base -o models/staging --split-columns true
    dbtgen columns models/base/accounts.sql --format json")]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: ./dbtgen.toml, then the user config directory)
    #[arg(long, global = true, env = "DBTGEN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Drop source columns prefixed with "_" (ingestion metadata) [default: true]
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    drop_metadata: Option<bool>,

    /// Treat column names as case-sensitive, otherwise force all to lower [default: false]
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    case_sensitive: Option<bool>,

    /// Leading (vs trailing) commas in the column list [default: false]
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    leading_commas: Option<bool>,

    /// Stop at the first model that fails
    #[arg(long)]
    fail_fast: bool,
}

#[derive(Args)]
struct HeuristicArgs {
    /// Split column names, e.g. currencyCode => currency_code [default: false]
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    split_columns: Option<bool>,

    /// Cast *id columns to the warehouse integer type [default: false]
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    id_as_int: Option<bool>,

    /// Cast *_at columns to the warehouse timestamp type [default: false]
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    convert_timestamp: Option<bool>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform base models in a directory using a transforms.yml file
    Transform {
        /// Directory of models
        #[arg(short, long)]
        model_path: PathBuf,
        /// Transforms .yml file
        #[arg(short, long)]
        transforms_path: PathBuf,
        /// Directory to write transformed models to
        #[arg(short, long)]
        output_path: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Transform one base model using a transforms.yml file
    Transforms {
        /// One model file
        #[arg(short, long)]
        model_path: PathBuf,
        /// Transforms .yml file
        #[arg(short, long)]
        transforms_path: PathBuf,
        /// Directory to write the transformed model to
        #[arg(short, long)]
        output_path: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Transform base models in a directory for a BigQuery source
    BqTransform {
        #[command(flatten)]
        target: WarehouseArgs,
    },
    /// Transform base models in a directory for a Snowflake source
    SfTransform {
        #[command(flatten)]
        target: WarehouseArgs,
    },
    /// Show the column list extracted from a model
    Columns {
        /// The model file
        path: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Args)]
struct WarehouseArgs {
    /// Directory of models
    #[arg(short, long)]
    model_path: PathBuf,
    /// Directory to write transformed models to
    #[arg(short, long)]
    output_path: PathBuf,
    /// Optional transforms .yml file applied on top of the heuristics
    #[arg(short, long)]
    transforms_path: Option<PathBuf>,
    #[command(flatten)]
    common: CommonArgs,
    #[command(flatten)]
    heuristics: HeuristicArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "dbtgen=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Returns whether every model was transformed.
async fn run(cli: &Cli) -> Result<bool> {
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Transform {
            model_path,
            transforms_path,
            output_path,
            common,
        } => {
            let config = resolve_config(config_path, common, None)?;
            let spec = TransformSpec::load(transforms_path)?;
            run_batch(model_path, output_path, spec, Dialect::Generic, &config).await
        }
        Commands::Transforms {
            model_path,
            transforms_path,
            output_path,
            common,
        } => {
            let config = resolve_config(config_path, common, None)?;
            let spec = TransformSpec::load(transforms_path)?;
            run_single(model_path, output_path, spec, &config)
        }
        Commands::BqTransform { target } => run_warehouse(config_path, target, Dialect::BigQuery).await,
        Commands::SfTransform { target } => run_warehouse(config_path, target, Dialect::Snowflake).await,
        Commands::Columns { path, format } => {
            show_columns(path, format)?;
            Ok(true)
        }
    }
}

/// File values first, then any flag given on the command line.
fn resolve_config(
    path: Option<&Path>,
    common: &CommonArgs,
    heuristics: Option<&HeuristicArgs>,
) -> Result<DbtGenConfig> {
    let base = match path {
        Some(path) => DbtGenConfig::load(path)?,
        None => DbtGenConfig::discover()?,
    };

    let mut builder = base.into_builder();
    if let Some(v) = common.drop_metadata {
        builder = builder.drop_metadata(v);
    }
    if let Some(v) = common.case_sensitive {
        builder = builder.case_sensitive(v);
    }
    if let Some(v) = common.leading_commas {
        builder = builder.leading_commas(v);
    }
    if common.fail_fast {
        builder = builder.fail_fast(true);
    }
    if let Some(h) = heuristics {
        if let Some(v) = h.split_columns {
            builder = builder.split_columns(v);
        }
        if let Some(v) = h.id_as_int {
            builder = builder.id_as_int(v);
        }
        if let Some(v) = h.convert_timestamp {
            builder = builder.convert_timestamp(v);
        }
    }
    Ok(builder.build())
}

async fn run_warehouse(config_path: Option<&Path>, target: &WarehouseArgs, dialect: Dialect) -> Result<bool> {
    let config = resolve_config(config_path, &target.common, Some(&target.heuristics))?;
    let spec = match &target.transforms_path {
        Some(path) => TransformSpec::load(path)?,
        None => TransformSpec::new(),
    };
    run_batch(&target.model_path, &target.output_path, spec, dialect, &config).await
}

async fn run_batch(
    model_dir: &Path,
    output_dir: &Path,
    spec: TransformSpec,
    dialect: Dialect,
    config: &DbtGenConfig,
) -> Result<bool> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let processor = ModelProcessor::from_config(spec, dialect, config);
    let report = processor
        .process_dir(model_dir, output_dir, config.fail_fast)
        .await?;
    print_report(&report);
    Ok(report.is_success())
}

fn run_single(
    model_file: &Path,
    output_dir: &Path,
    spec: TransformSpec,
    config: &DbtGenConfig,
) -> Result<bool> {
    let file_name = model_file
        .file_name()
        .with_context(|| format!("{} is not a file", model_file.display()))?;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let output = output_dir.join(file_name);
    let processor = ModelProcessor::from_config(spec, Dialect::Generic, config);
    let report = match processor.process_file(model_file, &output) {
        Ok(()) => BatchReport {
            written: vec![output],
            failed: vec![],
        },
        Err(e) => BatchReport {
            written: vec![],
            failed: vec![e],
        },
    };
    print_report(&report);
    Ok(report.is_success())
}

fn print_report(report: &BatchReport) {
    for path in &report.written {
        println!("{} {}", "✓".green(), path.display().to_string().cyan());
    }
    for err in &report.failed {
        eprintln!("{} {}", "✗".red(), err);
    }
    println!();
    let summary = format!(
        "{} transformed, {} failed",
        report.written.len(),
        report.failed.len()
    );
    if report.is_success() {
        println!("{}", summary.green().bold());
    } else {
        println!("{}", summary.red().bold());
    }
}

fn show_columns(path: &Path, format: &OutputFormat) -> Result<()> {
    let sql = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let columns = extract(&sql).map_err(|e| DbtGenError::in_file(path, e))?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&columns)?);
        }
        OutputFormat::Table => {
            let width = columns
                .iter()
                .map(|c| c.source_name.len())
                .max()
                .unwrap_or(0)
                .max("Name".len());

            println!(
                "{:>4}  {:width$}  {}",
                "#".white().bold(),
                "Name".white().bold(),
                "Expression".white().bold(),
                width = width
            );
            println!("{}", "─".repeat(width + 20).dimmed());
            for col in &columns {
                let name = format!("{:width$}", col.source_name, width = width);
                let name = if col.is_metadata { name.dimmed() } else { name.white() };
                let expression = if col.is_aliased() {
                    col.expression.yellow().to_string()
                } else {
                    String::new()
                };
                println!("{:>4}  {}  {}", col.position, name, expression);
            }
            println!();
            println!("{} column(s)", columns.len().to_string().cyan());
        }
    }
    Ok(())
}
