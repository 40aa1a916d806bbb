//! Run coordinator: selects jobs, runs them in order and keeps the ledger.

use crate::config::{Config, JobConfig};
use crate::error::{LoadError, Result};
use crate::export::BulkExporter;
use crate::pipeline::{self, JobPlan, JobResult, RetryPolicy, TablePipeline};
use crate::source::{MssqlSource, SchemaSource};
use crate::state::{config_hash, JobRecord, JobStatus, RunLedger};
use crate::warehouse::{self, Warehouse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run coordinator.
pub struct Orchestrator {
    config: Arc<Config>,
    state_file: Option<PathBuf>,
    source: Arc<dyn SchemaSource>,
    warehouse: Option<Arc<dyn Warehouse>>,
}

/// Result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: completed, failed or cancelled.
    pub status: String,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub jobs_total: usize,

    pub jobs_succeeded: usize,

    pub jobs_failed: usize,

    /// Jobs not started because the run was cancelled.
    pub jobs_skipped: usize,

    /// Rows loaded across all jobs.
    pub rows_loaded: i64,

    /// Rows rejected by COPY INTO across all jobs.
    pub error_count: i64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,

    pub failed_jobs: Vec<String>,

    pub jobs: Vec<JobResult>,
}

impl RunSummary {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_success(&self) -> bool {
        self.status == "completed"
    }
}

/// Connectivity report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,

    pub bcp_ok: bool,
    pub bcp_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcp_error: Option<String>,

    pub warehouse_connected: bool,
    pub warehouse_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_error: Option<String>,

    pub healthy: bool,
}

impl Orchestrator {
    /// Connect to the source and the warehouse.
    pub async fn new(config: Config) -> Result<Self> {
        let source = MssqlSource::connect(&config.source).await?;
        let warehouse = warehouse::connect(&config.warehouse).await?;
        Ok(Self::from_parts(config, Arc::new(source), Some(warehouse)))
    }

    /// Connect to the source only. Enough for planning and DDL generation.
    pub async fn source_only(config: Config) -> Result<Self> {
        let source = MssqlSource::connect(&config.source).await?;
        Ok(Self::from_parts(config, Arc::new(source), None))
    }

    /// Assemble from already connected components.
    pub fn from_parts(
        config: Config,
        source: Arc<dyn SchemaSource>,
        warehouse: Option<Arc<dyn Warehouse>>,
    ) -> Self {
        let state_file = config.state_file.clone();
        Self {
            config: Arc::new(config),
            state_file,
            source,
            warehouse,
        }
    }

    /// Record job outcomes in a ledger file.
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve job names; an empty selection means every enabled job.
    pub fn select_jobs(&self, names: &[String]) -> Result<Vec<JobConfig>> {
        select_jobs(&self.config, names)
    }

    /// Describe the selected jobs without running them.
    pub async fn plan(&self, names: &[String]) -> Result<Vec<JobPlan>> {
        let mut plans = Vec::new();
        for job in self.select_jobs(names)? {
            plans.push(pipeline::plan(&self.config, self.source.as_ref(), &job).await?);
        }
        Ok(plans)
    }

    /// Generated DDL for one job.
    pub async fn ddl(&self, name: &str) -> Result<String> {
        let job = self
            .config
            .job(name)
            .ok_or_else(|| unknown_job(name))?;
        let retry = RetryPolicy::from_config(&self.config.retry);
        pipeline::build_ddl(&self.config, self.source.as_ref(), &job, &retry, &mut 0).await
    }

    /// Run the selected jobs one after another.
    ///
    /// A failed job marks the run failed but does not stop later jobs.
    /// Cancellation is honoured between jobs and during retry backoff.
    pub async fn run(&self, names: &[String], cancel: CancellationToken) -> Result<RunSummary> {
        let jobs = self.select_jobs(names)?;
        let warehouse = self
            .warehouse
            .clone()
            .ok_or_else(|| LoadError::Config("warehouse is not connected".into()))?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();
        info!("Starting run {} ({} job(s))", run_id, jobs.len());

        let mut ledger = self.load_ledger()?;

        let retry = RetryPolicy::from_config(&self.config.retry).with_cancel(cancel.clone());
        let pipeline = TablePipeline::new(
            Arc::clone(&self.config),
            Arc::clone(&self.source),
            warehouse,
            retry,
        );

        let mut results = Vec::with_capacity(jobs.len());
        let mut skipped = 0;
        for job in &jobs {
            if cancel.is_cancelled() {
                skipped += 1;
                continue;
            }

            let result = pipeline.run(job).await;

            if let Some(ledger) = ledger.as_mut() {
                ledger.record(&job.name, job_record(&run_id, &result));
                self.save_ledger(ledger)?;
            }
            results.push(result);
        }

        if skipped > 0 {
            warn!("Run {} cancelled, {} job(s) not started", run_id, skipped);
        }

        Ok(summarize(run_id, started_at, start, results, skipped))
    }

    /// Configured jobs with their last ledger records.
    pub fn status(&self) -> Result<Vec<(JobConfig, Option<JobRecord>)>> {
        job_status(&self.config, self.state_file.as_deref())
    }

    fn load_ledger(&self) -> Result<Option<RunLedger>> {
        let Some(path) = &self.state_file else {
            return Ok(None);
        };
        let mut ledger = RunLedger::load_or_default(path)?;
        ledger.check_config(&config_hash(&self.config.effective_jobs())?);
        Ok(Some(ledger))
    }

    fn save_ledger(&self, ledger: &mut RunLedger) -> Result<()> {
        if let Some(path) = &self.state_file {
            ledger.save(path)?;
        }
        Ok(())
    }
}

/// Resolve job names against the configuration.
pub fn select_jobs(config: &Config, names: &[String]) -> Result<Vec<JobConfig>> {
    if names.is_empty() {
        return Ok(config
            .effective_jobs()
            .into_iter()
            .filter(|j| j.enabled)
            .collect());
    }
    names
        .iter()
        .map(|name| config.job(name).ok_or_else(|| unknown_job(name)))
        .collect()
}

/// Configured jobs with their last ledger records. Needs no connection.
pub fn job_status(
    config: &Config,
    state_file: Option<&Path>,
) -> Result<Vec<(JobConfig, Option<JobRecord>)>> {
    let ledger = match state_file {
        Some(path) => RunLedger::load_or_default(path)?,
        None => RunLedger::default(),
    };
    Ok(config
        .effective_jobs()
        .into_iter()
        .map(|job| {
            let record = ledger.get(&job.name).cloned();
            (job, record)
        })
        .collect())
}

fn unknown_job(name: &str) -> LoadError {
    LoadError::Config(format!("unknown job '{}'", name))
}

fn job_record(run_id: &str, result: &JobResult) -> JobRecord {
    JobRecord {
        run_id: run_id.to_string(),
        status: result.status,
        started_at: result.started_at,
        finished_at: result.completed_at,
        rows_loaded: result.load.rows_loaded,
        error_count: result.load.error_count,
        target_row_count: result.target_row_count,
        error: result.error.clone(),
        last_success_at: None,
    }
}

fn summarize(
    run_id: String,
    started_at: DateTime<Utc>,
    start: Instant,
    jobs: Vec<JobResult>,
    skipped: usize,
) -> RunSummary {
    let duration_seconds = start.elapsed().as_secs_f64();
    let rows_loaded: i64 = jobs.iter().map(|j| j.load.rows_loaded).sum();
    let error_count: i64 = jobs.iter().map(|j| j.load.error_count).sum();
    let failed_jobs: Vec<String> = jobs
        .iter()
        .filter(|j| !j.is_success())
        .map(|j| j.job.clone())
        .collect();
    let jobs_succeeded = jobs.len() - failed_jobs.len();
    let cancelled = skipped > 0 || jobs.iter().any(|j| j.status == JobStatus::Cancelled);

    let status = if cancelled {
        "cancelled"
    } else if failed_jobs.is_empty() {
        "completed"
    } else {
        "failed"
    };

    let rows_per_second = if duration_seconds > 0.0 {
        (rows_loaded as f64 / duration_seconds) as i64
    } else {
        0
    };

    info!(
        "Run {} {}: {}/{} job(s) succeeded, {} rows in {:.2}s",
        run_id,
        status,
        jobs_succeeded,
        jobs.len() + skipped,
        rows_loaded,
        duration_seconds
    );

    RunSummary {
        run_id,
        status: status.to_string(),
        started_at,
        completed_at: Utc::now(),
        duration_seconds,
        jobs_total: jobs.len() + skipped,
        jobs_succeeded,
        jobs_failed: failed_jobs.len(),
        jobs_skipped: skipped,
        rows_loaded,
        error_count,
        rows_per_second,
        failed_jobs,
        jobs,
    }
}

/// Check the source, bcp and the warehouse independently.
pub async fn health_check(config: &Config) -> HealthCheckResult {
    let start = Instant::now();
    let (source_version, source_error) = match MssqlSource::connect(&config.source).await {
        Ok(source) => match source.ping().await {
            Ok(v) => (Some(v), None),
            Err(e) => (None, Some(e.to_string())),
        },
        Err(e) => (None, Some(e.to_string())),
    };
    let source_latency_ms = start.elapsed().as_millis() as u64;

    let start = Instant::now();
    let bcp_error = BulkExporter::from_config(config)
        .check_login()
        .await
        .err()
        .map(|e| e.to_string());
    let bcp_latency_ms = start.elapsed().as_millis() as u64;

    let start = Instant::now();
    let (warehouse_version, warehouse_error) = match warehouse::connect(&config.warehouse).await {
        Ok(wh) => match wh.query("SELECT CURRENT_VERSION()").await {
            Ok(r) => (r.scalar_string(), None),
            Err(e) => (None, Some(e.to_string())),
        },
        Err(e) => (None, Some(e.to_string())),
    };
    let warehouse_latency_ms = start.elapsed().as_millis() as u64;

    let source_connected = source_error.is_none();
    let bcp_ok = bcp_error.is_none();
    let warehouse_connected = warehouse_error.is_none();

    HealthCheckResult {
        source_connected,
        source_latency_ms,
        source_version,
        source_error,
        bcp_ok,
        bcp_latency_ms,
        bcp_error,
        warehouse_connected,
        warehouse_latency_ms,
        warehouse_version,
        warehouse_error,
        healthy: source_connected && bcp_ok && warehouse_connected,
    }
}
