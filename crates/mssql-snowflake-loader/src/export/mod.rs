//! Bulk export of source tables to delimited files through `bcp`.

mod command;

pub use command::{to_wsl_path, BcpCommand};

use crate::config::{Config, ExportConfig, JobConfig, SourceConfig};
use crate::error::{LoadError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Export query for a table, capped at `row_cap` rows.
///
/// The query reads with `NOLOCK` (read uncommitted): it never blocks writers
/// on the source, but it can see rows from transactions that are still in
/// flight or later roll back.
pub fn export_query(table: &str, row_cap: u64) -> String {
    format!("SELECT TOP {} * FROM {} WITH (NOLOCK)", row_cap, table)
}

/// Parameters of one export.
#[derive(Debug, Clone)]
pub struct ExportParams {
    pub source_table: String,
    /// Custom query; replaces the capped `SELECT TOP` when set.
    pub query: Option<String>,
    pub output_path: PathBuf,
    pub delimiter: String,
    pub row_terminator: String,
    pub row_cap: u64,
}

impl ExportParams {
    pub fn for_job(config: &Config, job: &JobConfig) -> Self {
        Self {
            source_table: job.source_table.clone(),
            query: job.query.clone(),
            output_path: config.output_path(job),
            delimiter: config.export.delimiter.clone(),
            row_terminator: config.export.row_terminator.clone(),
            row_cap: job.row_cap.unwrap_or(config.export.default_row_cap),
        }
    }

    /// The statement bcp runs.
    pub fn query_text(&self) -> String {
        match &self.query {
            Some(q) => q.trim().to_string(),
            None => export_query(&self.source_table, self.row_cap),
        }
    }
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub duration: Duration,
    pub file_size_bytes: u64,
    pub output_path: PathBuf,
}

impl ExportOutcome {
    pub fn size_mb(&self) -> f64 {
        self.file_size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Runs bcp against the configured source.
#[derive(Debug, Clone)]
pub struct BulkExporter {
    source: SourceConfig,
    export: ExportConfig,
}

impl BulkExporter {
    pub fn new(source: SourceConfig, export: ExportConfig) -> Self {
        Self { source, export }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.source.clone(), config.export.clone())
    }

    /// Build the bcp invocation for `params` without running it.
    pub fn command(&self, params: &ExportParams) -> BcpCommand {
        self.command_for_query(&params.query_text(), &params.output_path)
            .delimiter(params.delimiter.as_str())
            .row_terminator(params.row_terminator.as_str())
    }

    fn command_for_query(&self, query: &str, output_path: &Path) -> BcpCommand {
        let path = output_path.to_string_lossy();
        let cmd = if self.export.use_wsl {
            BcpCommand::new(self.export.bcp_program(), query, to_wsl_path(&path)).launcher("wsl")
        } else {
            BcpCommand::new(self.export.bcp_program(), query, path.to_string())
        };

        cmd.connection(
            self.source.bcp_server(),
            self.source.database.as_str(),
            self.source.user.as_str(),
            self.source.password.as_str(),
        )
        .batch_size(self.export.batch_size)
        .packet_size(self.export.packet_size)
        .trust_server_cert(self.source.trust_server_cert)
    }

    /// Export to `params.output_path`, replacing any file already there.
    pub async fn export(&self, params: &ExportParams) -> Result<ExportOutcome> {
        let output_path = &params.output_path;

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        if tokio::fs::try_exists(output_path).await? {
            tokio::fs::remove_file(output_path).await?;
            info!("Removed existing file: {}", output_path.display());
        }

        let cmd = self.command(params);
        info!("Exporting {} via bcp", params.source_table);
        debug!("bcp command: {}", cmd);

        let start = Instant::now();
        let output = Command::new(cmd.program())
            .args(cmd.args())
            .output()
            .await?;
        let duration = start.elapsed();

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            error!(
                "bcp failed for {} (exit code {:?})",
                params.source_table,
                output.status.code()
            );
            error!("bcp stdout: {}", stdout.trim());
            error!("bcp stderr: {}", stderr.trim());
            return Err(LoadError::ExportFailed {
                table: params.source_table.clone(),
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        let metadata = match tokio::fs::metadata(output_path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::MissingOutput(output_path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let outcome = ExportOutcome {
            duration,
            file_size_bytes: metadata.len(),
            output_path: output_path.clone(),
        };
        info!(
            "Export of {} finished in {:.2}s ({:.2} MB)",
            params.source_table,
            duration.as_secs_f64(),
            outcome.size_mb()
        );
        Ok(outcome)
    }

    /// Check that bcp runs and can log in, by exporting `SELECT @@VERSION`.
    ///
    /// Returns the first line of the version text.
    pub async fn check_login(&self) -> Result<String> {
        let path = self.export.output_dir.join(".bcp_check.txt");
        let params = ExportParams {
            source_table: "@@VERSION".to_string(),
            query: Some("SELECT @@VERSION".to_string()),
            output_path: path.clone(),
            delimiter: self.export.delimiter.clone(),
            row_terminator: self.export.row_terminator.clone(),
            row_cap: 1,
        };
        self.export(&params).await?;

        let version = tokio::fs::read_to_string(&path).await.unwrap_or_default();
        tokio::fs::remove_file(&path).await.ok();
        Ok(version.lines().next().unwrap_or_default().trim().to_string())
    }
}
