//! Job results and dry-run plans.

use crate::state::JobStatus;
use crate::warehouse::LoadResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// Job name.
    pub job: String,

    pub source_table: String,

    /// Fully qualified target table.
    pub target_table: String,

    pub status: JobStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Copy outcome (rows loaded, rejected rows, per-file detail).
    pub load: LoadResult,

    /// Time spent in bcp.
    pub export_seconds: f64,

    /// Size of the exported file.
    pub file_size_bytes: u64,

    /// Files present in the stage after upload.
    pub staged_files: usize,

    /// Target row count after the load.
    pub target_row_count: Option<i64>,

    /// Total elapsed time.
    pub duration_seconds: f64,

    /// Rows loaded per second over the whole job.
    pub rows_per_second: f64,

    /// Retries spent across all steps.
    pub retries: u32,

    /// Error message if the job failed.
    pub error: Option<String>,
}

impl JobResult {
    /// A result for a job that failed before completing.
    pub fn failure(
        job: &str,
        source_table: &str,
        target_table: &str,
        started_at: DateTime<Utc>,
        status: JobStatus,
        error: impl Into<String>,
    ) -> Self {
        let completed_at = Utc::now();
        Self {
            job: job.to_string(),
            source_table: source_table.to_string(),
            target_table: target_table.to_string(),
            status,
            started_at,
            completed_at,
            load: LoadResult::default(),
            export_seconds: 0.0,
            file_size_bytes: 0,
            staged_files: 0,
            target_row_count: None,
            duration_seconds: seconds_between(started_at, completed_at),
            rows_per_second: 0.0,
            retries: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

pub(crate) fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / 1000.0
}

/// What a job would do, without doing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPlan {
    pub job: String,
    pub source_table: String,
    pub target_table: String,
    /// Redacted bcp command line.
    pub export_command: String,
    pub ddl: String,
    /// Load statements in execution order (the DDL runs after the first two).
    pub load_statements: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_failure_result() {
        let started = Utc::now() - Duration::seconds(2);
        let result = JobResult::failure(
            "equipment",
            "dbo.V_Equipment",
            "D.S.AI_V_Equipment",
            started,
            JobStatus::Failed,
            "bcp failed",
        );
        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("bcp failed"));
        assert!(result.duration_seconds >= 2.0);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["load"]["rows_loaded"], 0);
    }
}
