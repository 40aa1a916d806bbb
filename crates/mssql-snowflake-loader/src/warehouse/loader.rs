//! Stage, copy and verify sequence for one job.

use super::sql::{self, FileFormatOptions, LoadObjects};
use super::{QueryResult, Warehouse};
use crate::config::LoadConfig;
use crate::ddl::TargetTable;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const ROWS_LOADED_FALLBACK: usize = 3;
const ERRORS_SEEN_FALLBACK: usize = 5;

/// Outcome for one staged file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLoadResult {
    pub file: String,
    pub status: String,
    pub rows_loaded: i64,
    pub errors_seen: i64,
}

/// Aggregated outcome of a copy.
///
/// A nonzero `error_count` is reported here rather than raised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadResult {
    pub rows_loaded: i64,
    pub error_count: i64,
    pub duration_seconds: f64,
    pub files: Vec<FileLoadResult>,
}

impl LoadResult {
    pub fn from_files(files: Vec<FileLoadResult>, duration_seconds: f64) -> Self {
        Self {
            rows_loaded: files.iter().map(|f| f.rows_loaded).sum(),
            error_count: files.iter().map(|f| f.errors_seen).sum(),
            duration_seconds,
            files,
        }
    }
}

/// Per-file rows of a `COPY INTO` result.
///
/// Columns are located by name, falling back to the documented positions.
/// A lone status row ("Copy executed with 0 files processed.") yields no files.
pub fn parse_copy_result(result: &QueryResult) -> Vec<FileLoadResult> {
    let rows_idx = result
        .column_index("rows_loaded")
        .unwrap_or(ROWS_LOADED_FALLBACK);
    let errors_idx = result
        .column_index("errors_seen")
        .unwrap_or(ERRORS_SEEN_FALLBACK);
    let file_idx = result.column_index("file").unwrap_or(0);
    let status_idx = result.column_index("status").unwrap_or(1);

    let cell = |row: &[Option<String>], idx: usize| -> Option<String> {
        row.get(idx).and_then(|v| v.clone())
    };
    let number = |row: &[Option<String>], idx: usize| -> i64 {
        cell(row, idx)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    };

    result
        .rows
        .iter()
        .filter(|row| row.len() > rows_idx.max(errors_idx))
        .map(|row| FileLoadResult {
            file: cell(row, file_idx).unwrap_or_default(),
            status: cell(row, status_idx).unwrap_or_default(),
            rows_loaded: number(row, rows_idx),
            errors_seen: number(row, errors_idx),
        })
        .collect()
}

/// Runs the load steps for one job against a warehouse.
pub struct WarehouseLoader {
    warehouse: Arc<dyn Warehouse>,
    objects: LoadObjects,
    target: TargetTable,
    format: FileFormatOptions,
    load: LoadConfig,
}

impl WarehouseLoader {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        job_name: &str,
        target: TargetTable,
        delimiter: &str,
        load: LoadConfig,
    ) -> Self {
        Self {
            warehouse,
            objects: LoadObjects::for_job(job_name),
            target,
            format: FileFormatOptions::new(delimiter, &load),
            load,
        }
    }

    pub fn objects(&self) -> &LoadObjects {
        &self.objects
    }

    /// Create the file format, the stage and the target table.
    pub async fn setup(&self, ddl: &str) -> Result<()> {
        self.warehouse
            .execute(&sql::create_file_format(
                &self.objects.file_format,
                &self.format,
            ))
            .await?;
        self.warehouse
            .execute(&sql::create_stage(
                &self.objects.stage,
                &self.objects.file_format,
            ))
            .await?;
        debug!("DDL for {}:\n{}", self.target, ddl);
        self.warehouse.execute(ddl).await?;
        info!("Prepared {} (stage {})", self.target, self.objects.stage);
        Ok(())
    }

    /// PUT the file into the stage; returns the number of staged files.
    pub async fn upload(&self, path: &Path) -> Result<usize> {
        let start = Instant::now();
        self.warehouse
            .query(&sql::put(
                &path.to_string_lossy(),
                &self.objects.stage,
                self.load.auto_compress,
            ))
            .await?;

        let listing = self
            .warehouse
            .query(&sql::list_stage(&self.objects.stage))
            .await?;
        let staged = listing.rows.len();
        info!(
            "Uploaded {} to @{} in {:.2}s ({} file(s) staged)",
            path.display(),
            self.objects.stage,
            start.elapsed().as_secs_f64(),
            staged
        );
        Ok(staged)
    }

    /// COPY staged files into the target table.
    pub async fn copy(&self) -> Result<LoadResult> {
        let start = Instant::now();
        let statement = sql::copy_into(
            &self.target.to_string(),
            &self.objects.stage,
            &self.objects.file_format,
            &self.load,
        );
        let raw = self.warehouse.query(&statement).await?;
        let files = parse_copy_result(&raw);
        let result = LoadResult::from_files(files, start.elapsed().as_secs_f64());

        if result.error_count > 0 {
            warn!(
                "COPY INTO {} loaded {} rows with {} errors",
                self.target, result.rows_loaded, result.error_count
            );
        } else {
            info!(
                "COPY INTO {} loaded {} rows in {:.2}s",
                self.target, result.rows_loaded, result.duration_seconds
            );
        }
        Ok(result)
    }

    /// Row count of the target table after the load.
    ///
    /// `None` when the count cannot be read from the result.
    pub async fn verify(&self) -> Result<Option<i64>> {
        let result = self
            .warehouse
            .query(&sql::count_rows(&self.target.to_string()))
            .await?;
        match result.scalar_i64() {
            Some(count) => {
                info!("{} now holds {} rows", self.target, count);
                Ok(Some(count))
            }
            None => {
                warn!(
                    "Could not read the row count of {} from {:?}",
                    self.target, result.rows
                );
                Ok(None)
            }
        }
    }
}
