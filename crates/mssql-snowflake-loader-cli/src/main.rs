//! mssql-snowflake-loader CLI - scheduled SQL Server to Snowflake bulk loads.

use clap::{Parser, Subcommand};
use mssql_snowflake_loader::config::missing_config;
use mssql_snowflake_loader::{
    health_check, job_status, Config, LoadError, Orchestrator, RunSummary, Scheduler,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mssql-snowflake-loader")]
#[command(about = "Scheduled bulk loads from SQL Server into Snowflake")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (settings come from the environment when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the run ledger file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run jobs now
    Run {
        /// Job to run (repeatable; default: all enabled jobs)
        #[arg(long = "job")]
        jobs: Vec<String>,

        /// Dry run: print DDL and the bcp command without loading data
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the generated CREATE TABLE statement for a job
    Ddl {
        /// Job name
        #[arg(long)]
        job: String,
    },

    /// Run jobs on their daily triggers until interrupted
    Schedule,

    /// List configured jobs
    ListJobs,

    /// Test bcp, source and warehouse connectivity
    HealthCheck,

    /// Show the last recorded outcome of every job
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, LoadError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = load_config(cli.config.as_ref())?;
    let state_file = cli.state_file.clone().or_else(|| config.state_file.clone());

    match cli.command {
        Commands::ListJobs => {
            let jobs = config.effective_jobs();
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else {
                for job in &jobs {
                    println!(
                        "{:<28} {:<36} -> {:<32} [{}]{}",
                        job.name,
                        job.source_table,
                        job.target_table,
                        job.schedule,
                        if job.enabled { "" } else { " (disabled)" }
                    );
                }
            }
        }

        Commands::Status => {
            let status = job_status(&config, state_file.as_deref())?;
            if cli.output_json {
                let mut records = serde_json::Map::new();
                for (job, record) in &status {
                    records.insert(job.name.clone(), serde_json::to_value(record)?);
                }
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for (job, record) in &status {
                    match record {
                        Some(r) => {
                            println!(
                                "{:<28} {:?} at {} ({} rows, {} errors)",
                                job.name,
                                r.status,
                                r.finished_at.to_rfc3339(),
                                r.rows_loaded,
                                r.error_count
                            );
                            if let Some(ref err) = r.error {
                                println!("    Error: {}", err);
                            }
                        }
                        None => println!("{:<28} never run", job.name),
                    }
                }
            }
        }

        Commands::Ddl { job } => {
            let orchestrator = Orchestrator::source_only(config).await?;
            println!("{}", orchestrator.ddl(&job).await?);
        }

        Commands::Run { jobs, dry_run: true } => {
            let orchestrator = Orchestrator::source_only(config).await?;
            let plans = orchestrator.plan(&jobs).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plans)?);
            } else {
                for plan in &plans {
                    println!("Job {}: {} -> {}", plan.job, plan.source_table, plan.target_table);
                    println!("  Export: {}", plan.export_command);
                    println!("\n{};\n", plan.ddl);
                    for statement in &plan.load_statements {
                        println!("{};", statement);
                    }
                    println!();
                }
            }
        }

        Commands::Run { jobs, dry_run: false } => {
            let cancel_token = setup_signal_handler();
            let mut orchestrator = Orchestrator::new(config).await?;
            if let Some(path) = state_file {
                orchestrator = orchestrator.with_state_file(path);
            }

            let summary = orchestrator.run(&jobs, cancel_token).await?;
            print_summary(&summary, cli.output_json)?;

            if summary.status == "cancelled" {
                return Ok(ExitCode::from(LoadError::Cancelled.exit_code()));
            }
            if !summary.is_success() {
                return Ok(ExitCode::from(1));
            }
        }

        Commands::Schedule => {
            let scheduler = Scheduler::new(&config.effective_jobs())
                .map_err(|e| LoadError::Config(e.to_string()))?;
            let cancel_token = setup_signal_handler();
            info!("Scheduler started");

            let output_json = cli.output_json;
            scheduler
                .run_until_cancelled(cancel_token.clone(), |jobs| {
                    let config = config.clone();
                    let state_file = state_file.clone();
                    let cancel = cancel_token.clone();
                    async move {
                        if let Err(e) = run_scheduled(config, state_file, jobs, cancel, output_json).await {
                            error!("Scheduled run failed: {}", e);
                        }
                    }
                })
                .await;
        }

        Commands::HealthCheck => {
            let result = health_check(&config).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (SQL Server): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref version) = result.source_version {
                    println!("    Version: {}", version);
                }
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  bcp: {} ({}ms)",
                    if result.bcp_ok { "OK" } else { "FAILED" },
                    result.bcp_latency_ms
                );
                if let Some(ref err) = result.bcp_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Warehouse (Snowflake): {} ({}ms)",
                    if result.warehouse_connected { "OK" } else { "FAILED" },
                    result.warehouse_latency_ms
                );
                if let Some(ref version) = result.warehouse_version {
                    println!("    Version: {}", version);
                }
                if let Some(ref err) = result.warehouse_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Ok(ExitCode::from(1));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Load the file given with `--config`, or build the configuration from the environment.
fn load_config(path: Option<&PathBuf>) -> Result<Config, LoadError> {
    match path {
        Some(path) => {
            if !path.exists() {
                return Err(missing_config(path));
            }
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        None => Config::from_env(),
    }
}

/// One scheduler fire: connect, run the due jobs, disconnect.
async fn run_scheduled(
    config: Config,
    state_file: Option<PathBuf>,
    jobs: Vec<String>,
    cancel: CancellationToken,
    output_json: bool,
) -> Result<(), LoadError> {
    let mut orchestrator = Orchestrator::new(config).await?;
    if let Some(path) = state_file {
        orchestrator = orchestrator.with_state_file(path);
    }
    let summary = orchestrator.run(&jobs, cancel).await?;
    print_summary(&summary, output_json)
}

fn print_summary(summary: &RunSummary, output_json: bool) -> Result<(), LoadError> {
    if output_json {
        println!("{}", summary.to_json()?);
        return Ok(());
    }

    println!("\nRun {}", summary.status);
    println!("  Run ID: {}", summary.run_id);
    println!("  Duration: {:.2}s", summary.duration_seconds);
    println!("  Jobs: {}/{}", summary.jobs_succeeded, summary.jobs_total);
    println!("  Rows: {}", summary.rows_loaded);
    if summary.error_count > 0 {
        println!("  Rejected rows: {}", summary.error_count);
    }
    println!("  Throughput: {} rows/sec", summary.rows_per_second);
    if !summary.failed_jobs.is_empty() {
        println!("  Failed jobs: {:?}", summary.failed_jobs);
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json stays parseable
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM (service manager shutdown).
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    eprintln!("Failed to set up {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!("\nReceived {}. Finishing the current step and stopping...", name);
            token.cancel();
        });
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Failed to set up Ctrl-C handler: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Finishing the current step and stopping...");
        token.cancel();
    });

    cancel_token
}
