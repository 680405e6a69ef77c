use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nixcache_analysis::config::{load_config, ConfigSource, ReportConfig};
use nixcache_analysis::PipelineReport;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

mod analyze;
mod preliminary;

#[derive(Parser)]
#[command(name = "nixcache")]
#[command(about = "Compare nix build cache tools using exported CI timings")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "NIXCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze whitelisted runs and write detail, speedup, combined and summary reports
    Analyze(analyze::AnalyzeArgs),
    /// Analyze the fixed runs of the preliminary study
    Preliminary(preliminary::PreliminaryArgs),
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: Option<PathBuf>) -> Result<ReportConfig> {
    let source = match path {
        Some(path) => ConfigSource::File(path),
        None => ConfigSource::Environment,
    };
    let config = load_config(source).context("failed to load configuration")?;
    Ok(config)
}

fn print_written(report: &PipelineReport) {
    for path in &report.written {
        println!("wrote: {}", path.display());
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_settings(cli.config)?;

    let report = match cli.command {
        Commands::Analyze(args) => analyze::handle_command(args, &config)?,
        Commands::Preliminary(args) => preliminary::handle_command(args, &config)?,
    };
    print_written(&report);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
