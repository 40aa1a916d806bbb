//! Per-table extract-load pipeline.
//!
//! One job moves one source table into one target table:
//!
//! 1. export the source with bcp,
//! 2. build the target DDL (introspected, or the job's custom column block),
//! 3. create the file format, stage and table,
//! 4. PUT the file into the stage,
//! 5. COPY INTO the table,
//! 6. count the target rows.
//!
//! Every step runs under a [`RetryPolicy`]; only errors for which
//! [`LoadError::is_retryable`](crate::error::LoadError::is_retryable) holds
//! are retried.

mod job;
mod retry;

pub use job::{JobPlan, JobResult};
pub use retry::RetryPolicy;

use crate::config::{Config, JobConfig};
use crate::ddl::{generate_ddl, render_custom_ddl, DdlOptions, TargetTable};
use crate::error::{LoadError, Result};
use crate::export::{BulkExporter, ExportParams};
use crate::source::{SchemaSource, TableRef};
use crate::state::JobStatus;
use crate::warehouse::{sql, FileFormatOptions, LoadObjects, Warehouse, WarehouseLoader};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Target table of a job in the configured database and schema.
pub fn target_for(config: &Config, job: &JobConfig) -> TargetTable {
    TargetTable::new(
        config.warehouse.database.as_str(),
        config.warehouse.schema.as_str(),
        job.target_table.as_str(),
    )
}

/// Build the `CREATE TABLE` statement for a job.
pub async fn build_ddl(
    config: &Config,
    source: &dyn SchemaSource,
    job: &JobConfig,
    retry: &RetryPolicy,
    retries: &mut u32,
) -> Result<String> {
    let target = target_for(config, job);
    if let Some(columns) = &job.columns_ddl {
        return Ok(render_custom_ddl(&target, job.create_mode, columns));
    }

    let table = TableRef::parse(&job.source_table, &config.source.schema);
    let schema = retry
        .run_counted("introspect", || source.introspect(&table), retries)
        .await?;
    generate_ddl(&schema, &target, &DdlOptions::for_job(job))
}

/// Describe a job without exporting or loading anything.
///
/// Only the source catalog is read (and not even that when the job carries a
/// custom column block).
pub async fn plan(config: &Config, source: &dyn SchemaSource, job: &JobConfig) -> Result<JobPlan> {
    let exporter = BulkExporter::from_config(config);
    let params = ExportParams::for_job(config, job);
    let target = target_for(config, job);
    let objects = LoadObjects::for_job(&job.name);
    let format = FileFormatOptions::new(&config.export.delimiter, &config.load);

    let mut retries = 0;
    let ddl = build_ddl(config, source, job, &RetryPolicy::new(1, Default::default()), &mut retries).await?;

    Ok(JobPlan {
        job: job.name.clone(),
        source_table: job.source_table.clone(),
        target_table: target.to_string(),
        export_command: exporter.command(&params).to_string(),
        ddl,
        load_statements: vec![
            sql::create_file_format(&objects.file_format, &format),
            sql::create_stage(&objects.stage, &objects.file_format),
            sql::put(
                &params.output_path.to_string_lossy(),
                &objects.stage,
                config.load.auto_compress,
            ),
            sql::copy_into(&target.to_string(), &objects.stage, &objects.file_format, &config.load),
            sql::count_rows(&target.to_string()),
        ],
    })
}

/// Runs jobs against a source and a warehouse.
pub struct TablePipeline {
    config: Arc<Config>,
    source: Arc<dyn SchemaSource>,
    warehouse: Arc<dyn Warehouse>,
    exporter: BulkExporter,
    retry: RetryPolicy,
}

impl TablePipeline {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn SchemaSource>,
        warehouse: Arc<dyn Warehouse>,
        retry: RetryPolicy,
    ) -> Self {
        let exporter = BulkExporter::from_config(&config);
        Self {
            config,
            source,
            warehouse,
            exporter,
            retry,
        }
    }

    /// Run one job end to end.
    ///
    /// A failure is reported in the result, together with the retries spent
    /// before it.
    pub async fn run(&self, job: &JobConfig) -> JobResult {
        let started_at = Utc::now();
        let mut retries = 0;
        match self.run_steps(job, started_at, &mut retries).await {
            Ok(result) => result,
            Err(e) => {
                let status = if matches!(e, LoadError::Cancelled) {
                    JobStatus::Cancelled
                } else {
                    JobStatus::Failed
                };
                error!("Job {} failed after {} retries: {}", job.name, retries, e);
                let mut result = JobResult::failure(
                    &job.name,
                    &job.source_table,
                    &target_for(&self.config, job).to_string(),
                    started_at,
                    status,
                    e.to_string(),
                );
                result.retries = retries;
                result
            }
        }
    }

    async fn run_steps(
        &self,
        job: &JobConfig,
        started_at: DateTime<Utc>,
        retries: &mut u32,
    ) -> Result<JobResult> {
        let config = &self.config;
        let target = target_for(config, job);

        info!("Job {}: {} -> {}", job.name, job.source_table, target);

        if job.query.is_none() {
            let table = TableRef::parse(&job.source_table, &config.source.schema);
            match self.source.row_count(&table).await {
                Ok(rows) => info!("{} holds {} rows", table, rows),
                Err(e) => warn!("Could not count rows in {}: {}", table, e),
            }
        }

        // 1. Export
        let params = ExportParams::for_job(config, job);
        let export = self
            .retry
            .run_counted("export", || self.exporter.export(&params), retries)
            .await?;

        // 2. DDL
        let ddl = build_ddl(config, self.source.as_ref(), job, &self.retry, retries).await?;

        // 3-6. Load
        let loader = WarehouseLoader::new(
            Arc::clone(&self.warehouse),
            &job.name,
            target.clone(),
            &config.export.delimiter,
            config.load.clone(),
        );
        self.retry
            .run_counted("setup", || loader.setup(&ddl), retries)
            .await?;
        let staged_files = self
            .retry
            .run_counted("upload", || loader.upload(&export.output_path), retries)
            .await?;
        let load = self
            .retry
            .run_counted("copy", || loader.copy(), retries)
            .await?;
        let target_row_count = self
            .retry
            .run_counted("verify", || loader.verify(), retries)
            .await?;

        let completed_at = Utc::now();
        let duration_seconds = job::seconds_between(started_at, completed_at);
        let rows_per_second = if duration_seconds > 0.0 {
            load.rows_loaded as f64 / duration_seconds
        } else {
            0.0
        };

        info!(
            "Job {} finished: {} rows loaded, {} errors, {:.2}s ({:.0} rows/sec)",
            job.name, load.rows_loaded, load.error_count, duration_seconds, rows_per_second
        );

        Ok(JobResult {
            job: job.name.clone(),
            source_table: job.source_table.clone(),
            target_table: target.to_string(),
            status: JobStatus::Succeeded,
            started_at,
            completed_at,
            load,
            export_seconds: export.duration.as_secs_f64(),
            file_size_bytes: export.file_size_bytes,
            staged_files,
            target_row_count,
            duration_seconds,
            rows_per_second,
            retries: *retries,
            error: None,
        })
    }
}
