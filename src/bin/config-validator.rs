//! # Batch Configuration Validator
//!
//! Command-line tool for validating batch framework configuration across environments and
//! showing the sizing each operation type resolves to.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;
use tasker_batch::config::{BatchConfigResolver, BatchFrameworkConfig, ConfigManager};
use tasker_batch::constants::batch_types;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

const ENVIRONMENTS: [&str; 3] = ["development", "test", "production"];

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate batch framework configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config/batch)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Yaml,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration, then print it
    All,

    /// Show the resolved sizing of operation types (built-in types when none are given)
    Resolve {
        operation_types: Vec<String>,
    },

    /// Validate every known environment
    Environments,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate(&cli),
        Some(Commands::Resolve { operation_types }) => resolve(&cli, operation_types),
        Some(Commands::Environments) => validate_environments(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
        }
        Err(e) => {
            error!("Configuration validation failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli, environment: &str) -> Result<BatchFrameworkConfig> {
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        .with_context(|| format!("loading configuration for environment '{environment}'"))?;
    Ok(manager.config().clone())
}

fn validate(cli: &Cli) -> Result<()> {
    let config = load(cli, &cli.environment)?;
    println!("✅ Configuration for '{}' is valid", cli.environment);
    print_config(cli.format, &config)
}

fn validate_environments(cli: &Cli) -> Result<()> {
    let mut failed = Vec::new();
    for environment in ENVIRONMENTS {
        match load(cli, environment) {
            Ok(_) => println!("✅ {environment}"),
            Err(e) => {
                println!("❌ {environment}: {e:#}");
                failed.push(environment);
            }
        }
    }
    if !failed.is_empty() {
        bail!("invalid configuration for: {}", failed.join(", "));
    }
    Ok(())
}

fn resolve(cli: &Cli, operation_types: &[String]) -> Result<()> {
    let config = load(cli, &cli.environment)?;
    let resolver = BatchConfigResolver::new(&config.batch);

    let types: Vec<String> = if operation_types.is_empty() {
        [
            batch_types::HISTORIC_PROCESS_INSTANCE_DELETION,
            batch_types::HISTORIC_DECISION_INSTANCE_DELETION,
            batch_types::PROCESS_INSTANCE_DELETION,
            batch_types::SET_JOB_RETRIES,
        ]
        .iter()
        .map(|t| t.to_string())
        .chain(config.batch.invocations_per_batch_job_by_batch_type.keys().cloned())
        .chain(config.batch.batch_jobs_per_seed_by_batch_type.keys().cloned())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect()
    } else {
        operation_types.to_vec()
    };

    match cli.format {
        OutputFormat::Table => {
            println!(
                "{:<45} {:>20} {:>26}",
                "operation type", "batch_jobs_per_seed", "invocations_per_batch_job"
            );
            for operation_type in &types {
                let resolved = resolver.resolve(operation_type);
                println!(
                    "{:<45} {:>20} {:>26}",
                    operation_type, resolved.batch_jobs_per_seed, resolved.invocations_per_batch_job
                );
            }
        }
        OutputFormat::Json | OutputFormat::Yaml => {
            let resolved: std::collections::BTreeMap<&str, _> = types
                .iter()
                .map(|t| (t.as_str(), resolver.resolve(t)))
                .collect();
            if matches!(cli.format, OutputFormat::Json) {
                println!("{}", serde_json::to_string_pretty(&resolved)?);
            } else {
                print!("{}", serde_yaml::to_string(&resolved)?);
            }
        }
    }
    Ok(())
}

fn print_config(format: OutputFormat, config: &BatchFrameworkConfig) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(config)?),
        OutputFormat::Table => {
            println!("📦 Batch");
            println!(
                "   default_batch_jobs_per_seed: {}",
                config.batch.default_batch_jobs_per_seed
            );
            println!(
                "   default_invocations_per_batch_job: {}",
                config.batch.default_invocations_per_batch_job
            );
            println!(
                "   per-type overrides: {} invocation, {} seed",
                config.batch.invocations_per_batch_job_by_batch_type.len(),
                config.batch.batch_jobs_per_seed_by_batch_type.len()
            );
            println!("⚙️  Executor");
            println!("   max_concurrent_jobs: {}", config.executor.max_concurrent_jobs);
            println!("   poll_batch_size: {}", config.executor.poll_batch_size);
            println!("   polling_interval_ms: {}", config.executor.polling_interval_ms);
            println!("   default_job_retries: {}", config.executor.default_job_retries);
            println!("   job_timeout_ms: {:?}", config.executor.job_timeout_ms);
            println!("🔁 Backoff");
            println!(
                "   base {}ms, max {}ms, x{}, jitter {}",
                config.backoff.base_delay_ms,
                config.backoff.max_delay_ms,
                config.backoff.backoff_multiplier,
                config.backoff.jitter_enabled
            );
        }
    }
    Ok(())
}
