//! Fleet - incremental deploys for serverless function fleets
//!
//! Usage:
//!   fleet deploy              # Build, diff, and deploy changed functions
//!   fleet deploy --only api   # Restrict the run to named functions
//!   fleet list                # Show discovered functions
//!   fleet orphans             # Deployed functions with no local source
//!
//! Exit codes: 0 when every function succeeded, 1 when any function failed,
//! 2 when the run itself could not proceed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_core::context::AppContext;
use fleet_core::deploy::{DeployOutcome, DeployReport, TracingReporter};
use fleet_core::types::FunctionDescriptor;

const EXIT_FUNCTION_FAILED: u8 = 1;
const EXIT_PIPELINE_ERROR: u8 = 2;

#[derive(Parser)]
#[command(name = "fleet")]
#[command(about = "Incremental deploys for serverless function fleets", long_about = None)]
struct Cli {
    /// Path to fleet.toml (defaults to ./fleet.toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every function and deploy the ones that changed
    Deploy(DeployArgs),

    /// List discovered functions
    List {
        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },

    /// List functions deployed on the platform that have no local source
    ///
    /// Nothing is deleted; use the platform's own tooling to clean up.
    Orphans {
        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Args)]
struct DeployArgs {
    /// Redeploy functions even when their checksum is unchanged
    #[arg(long)]
    force: bool,

    /// Retry rounds for failed deploys (overrides deploy.retry_rounds)
    #[arg(long, value_name = "ROUNDS")]
    retry: Option<u32>,

    /// Concurrent builds (overrides deploy.build_concurrency)
    #[arg(long, value_name = "N")]
    build_concurrency: Option<usize>,

    /// Concurrent deploys (overrides deploy.deploy_concurrency)
    #[arg(long, value_name = "N")]
    deploy_concurrency: Option<usize>,

    /// Only deploy these functions (repeatable)
    #[arg(long = "only", value_name = "NAME")]
    only: Vec<String>,

    /// Output format
    #[arg(short = 'o', long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only show failures
    Quiet,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "fleet=debug,info"
    } else {
        "fleet=info,warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run_cli(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_PIPELINE_ERROR)
        }
    }
}

async fn run_cli(cli: Cli) -> Result<ExitCode> {
    let ctx = AppContext::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Deploy(args) => run_deploy(&ctx, args).await,
        Commands::List { format } => {
            let descriptors = ctx.scan()?;
            match format {
                OutputFormat::Json => print_json(&descriptors)?,
                OutputFormat::Table => print_functions_table(&descriptors),
                OutputFormat::Quiet => {}
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Orphans { format } => {
            let orphans = ctx.orphans().await?;
            match format {
                OutputFormat::Json => print_json(&orphans)?,
                OutputFormat::Table | OutputFormat::Quiet => print_orphans(&orphans),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_deploy(ctx: &AppContext, args: DeployArgs) -> Result<ExitCode> {
    let mut options = ctx.deploy_options();
    if args.force {
        options.force = true;
    }
    if let Some(rounds) = args.retry {
        options.retry_rounds = rounds;
    }
    if let Some(n) = args.build_concurrency {
        options.build_concurrency = n;
    }
    if let Some(n) = args.deploy_concurrency {
        options.deploy_concurrency = n;
    }
    options.only = args.only;

    let descriptors = ctx.scan()?;
    let orchestrator = ctx.orchestrator(options, Arc::new(TracingReporter))?;
    let report = orchestrator.run(descriptors).await?;

    match args.format {
        OutputFormat::Table => print_report_table(&report),
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Quiet => print_report_quiet(&report),
    }

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FUNCTION_FAILED)
    })
}

// =============================================================================
// Output
// =============================================================================

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_report_table(report: &DeployReport) {
    if report.results.is_empty() {
        println!("No functions to deploy.");
        return;
    }

    println!(
        "{:<32} {:<10} {:>8} {:>10}  Error",
        "Function", "Outcome", "Attempts", "Time"
    );
    println!("{}", "-".repeat(80));

    for result in &report.results {
        println!(
            "{:<32} {:<10} {:>8} {:>9.1}s  {}",
            result.function_name,
            result.outcome.to_string(),
            result.attempts,
            result.elapsed.as_secs_f64(),
            result.error.as_deref().unwrap_or("")
        );
    }

    println!();
    println!(
        "{} deployed, {} skipped, {} failed in {:.1}s ({} retry rounds)",
        report.count(DeployOutcome::Deployed),
        report.count(DeployOutcome::Skipped),
        report.count(DeployOutcome::Failed),
        report.elapsed.as_secs_f64(),
        report.retry_rounds_run
    );
    if report.cache.local_failed > 0 {
        println!(
            "warning: {} local checksum writes failed",
            report.cache.local_failed
        );
    }
    if let Some(error) = &report.cache.remote_error {
        println!("warning: {error}");
    }
}

fn print_report_quiet(report: &DeployReport) {
    for result in report.failed() {
        println!(
            "{}: {}",
            result.function_name,
            result.error.as_deref().unwrap_or("failed")
        );
    }
}

fn print_functions_table(descriptors: &[FunctionDescriptor]) {
    if descriptors.is_empty() {
        println!("No functions found.");
        return;
    }

    println!("{:<32} {:<10} {:<28} Source", "Name", "Trigger", "Route");
    println!("{}", "-".repeat(90));

    for descriptor in descriptors {
        let trigger = &descriptor.trigger;
        let target = trigger
            .route
            .as_deref()
            .or(trigger.schedule.as_deref())
            .or(trigger.event.as_deref())
            .unwrap_or("-");
        println!(
            "{:<32} {:<10} {:<28} {}",
            descriptor.function_name,
            trigger.kind.to_string(),
            target,
            descriptor.source_path.display()
        );
    }
}

fn print_orphans(orphans: &[String]) {
    if orphans.is_empty() {
        println!("No orphaned functions.");
        return;
    }
    for name in orphans {
        println!("{name}");
    }
}
