//! File-based run ledger: the last outcome of every job.

use crate::config::JobConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
    Cancelled,
    Skipped,
}

/// Last recorded run of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Run that produced this record.
    pub run_id: String,

    pub status: JobStatus,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    /// Rows reported by COPY INTO.
    pub rows_loaded: i64,

    /// Rejected rows reported by COPY INTO.
    pub error_count: i64,

    /// Target row count after the load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_row_count: Option<i64>,

    /// Error message if failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Finish time of the most recent successful run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Persistent ledger keyed by job name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLedger {
    /// SHA256 of the job definitions the ledger was last written with.
    #[serde(default)]
    pub config_hash: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub jobs: BTreeMap<String, JobRecord>,
}

impl RunLedger {
    /// Load a ledger from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load a ledger, or start an empty one when the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No ledger at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save to a file (atomic write).
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.updated_at = Some(Utc::now());

        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Warn when the job definitions differ from the ones last recorded.
    pub fn check_config(&mut self, config_hash: &str) {
        if !self.config_hash.is_empty() && self.config_hash != config_hash {
            warn!("Job definitions changed since the ledger was last written");
        }
        self.config_hash = config_hash.to_string();
    }

    /// Store the latest record for a job, carrying the last success time
    /// forward across failures.
    pub fn record(&mut self, job: &str, mut record: JobRecord) {
        if record.status == JobStatus::Succeeded {
            record.last_success_at = Some(record.finished_at);
        } else if let Some(prev) = self.jobs.get(job) {
            record.last_success_at = prev.last_success_at;
        }
        self.jobs.insert(job.to_string(), record);
    }

    pub fn get(&self, job: &str) -> Option<&JobRecord> {
        self.jobs.get(job)
    }
}

/// SHA256 of the serialized job definitions.
pub fn config_hash(jobs: &[JobConfig]) -> Result<String> {
    let content = serde_json::to_string(jobs)?;
    Ok(format!("{:x}", Sha256::digest(content.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn record(status: JobStatus, finished_at: DateTime<Utc>) -> JobRecord {
        JobRecord {
            run_id: "run-1".into(),
            status,
            started_at: finished_at - Duration::seconds(30),
            finished_at,
            rows_loaded: 150,
            error_count: 2,
            target_row_count: Some(150),
            error: None,
            last_success_at: None,
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("ledger.json");

        let mut ledger = RunLedger::default();
        ledger.check_config("abc");
        ledger.record("equipment", record(JobStatus::Succeeded, Utc::now()));
        ledger.save(&path).unwrap();

        assert!(!path.with_extension("tmp").exists());

        let loaded = RunLedger::load(&path).unwrap();
        assert_eq!(loaded, ledger);
        assert_eq!(loaded.get("equipment").unwrap().rows_loaded, 150);
    }

    #[test]
    fn test_missing_file_is_empty_ledger() {
        let dir = tempdir().unwrap();
        let ledger = RunLedger::load_or_default(dir.path().join("nope.json")).unwrap();
        assert!(ledger.jobs.is_empty());
    }

    #[test]
    fn test_failure_keeps_last_success() {
        let mut ledger = RunLedger::default();
        let success_at = Utc::now() - Duration::days(1);
        ledger.record("equipment", record(JobStatus::Succeeded, success_at));

        let mut failed = record(JobStatus::Failed, Utc::now());
        failed.error = Some("bcp failed".into());
        ledger.record("equipment", failed);

        let rec = ledger.get("equipment").unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert_eq!(rec.last_success_at, Some(success_at));
    }

    #[test]
    fn test_config_hash_tracks_job_changes() {
        let jobs = vec![JobConfig::new("a", "dbo.A", "A")];
        let mut changed = jobs.clone();
        changed[0].row_cap = Some(10);

        let h1 = config_hash(&jobs).unwrap();
        assert_eq!(h1.len(), 64);
        assert_eq!(h1, config_hash(&jobs).unwrap());
        assert_ne!(h1, config_hash(&changed).unwrap());
    }
}
