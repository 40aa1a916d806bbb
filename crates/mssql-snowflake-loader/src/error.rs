//! Error types for the loader library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for extract/load operations.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Configuration error (invalid YAML, missing fields, bad trigger, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or warehouse unreachable, or authentication rejected
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Source database query error
    #[error("Source database error: {0}")]
    Source(#[from] tiberius::error::Error),

    /// Warehouse statement failed
    #[error("Warehouse error: {message}")]
    Warehouse { message: String, sql: String },

    /// Catalog returned no columns for the table
    #[error("Table {0} not found or has no columns")]
    SchemaNotFound(String),

    /// Introspected schema violates ordering or uniqueness
    #[error("Invalid table schema: {0}")]
    InvalidSchema(String),

    /// bcp exited with a non-zero status
    #[error("bcp export failed for {table} (exit code {code:?})\n  stderr: {stderr}")]
    ExportFailed {
        table: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// bcp reported success but the output file does not exist
    #[error("bcp reported success but output file was not created: {0}")]
    MissingOutput(PathBuf),

    /// IO error (file operations, process spawn)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, SIGTERM)
    #[error("Run cancelled")]
    Cancelled,
}

impl LoadError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl Into<String>, context: impl Into<String>) -> Self {
        LoadError::Connection {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Warehouse error carrying the statement that failed
    pub fn warehouse(message: impl Into<String>, sql: impl Into<String>) -> Self {
        LoadError::Warehouse {
            message: message.into(),
            sql: sql.into(),
        }
    }

    /// Whether a bounded retry may succeed where this attempt failed.
    ///
    /// Connection, source, warehouse and bcp failures are retried unless the
    /// message shows a deterministic cause: SQL compilation errors, unknown
    /// objects, or rejected data under `ON_ERROR = ABORT_STATEMENT`.
    /// Misconfiguration (missing tables, missing output, bad config) is never
    /// retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoadError::Connection { .. } | LoadError::Source(_) => true,
            LoadError::Warehouse { message, .. } => !is_deterministic(message),
            LoadError::ExportFailed { stdout, stderr, .. } => {
                !is_deterministic(stderr) && !is_deterministic(stdout)
            }
            _ => false,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            LoadError::Config(_) | LoadError::Yaml(_) => 2,
            LoadError::Connection { .. } => 3,
            LoadError::SchemaNotFound(_) | LoadError::InvalidSchema(_) => 4,
            LoadError::ExportFailed { .. } | LoadError::MissingOutput(_) => 5,
            LoadError::Source(_) | LoadError::Warehouse { .. } => 6,
            LoadError::Cancelled => 130,
            LoadError::Io(_) | LoadError::Json(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        if let LoadError::Warehouse { sql, .. } = self {
            if !sql.is_empty() {
                output.push_str(&format!("\nStatement:\n  {}\n", sql.trim()));
            }
        }

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Error texts that fail the same way on every attempt.
const DETERMINISTIC_MARKERS: &[&str] = &[
    "sql compilation error",
    "syntax error",
    "does not exist or not authorized",
    "invalid object name",
    "invalid column name",
    "incorrect syntax",
    "is not recognized",
    "does not match that of the corresponding table",
];

fn is_deterministic(message: &str) -> bool {
    let message = message.to_lowercase();
    DETERMINISTIC_MARKERS.iter().any(|m| message.contains(m))
}

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LoadError::connection("refused", "snowflake").is_retryable());
        assert!(LoadError::warehouse("timeout", "COPY INTO T").is_retryable());
        assert!(LoadError::ExportFailed {
            table: "dbo.T".into(),
            code: Some(1),
            stdout: String::new(),
            stderr: "login failed".into(),
        }
        .is_retryable());

        assert!(!LoadError::SchemaNotFound("dbo.T".into()).is_retryable());
        assert!(!LoadError::MissingOutput(PathBuf::from("/tmp/x.csv")).is_retryable());
        assert!(!LoadError::Config("bad".into()).is_retryable());
        assert!(!LoadError::Cancelled.is_retryable());
    }

    #[test]
    fn test_deterministic_failures_are_not_retried() {
        assert!(!LoadError::warehouse(
            "SQL compilation error: Object 'X' does not exist or not authorized.",
            "COPY INTO X FROM @S"
        )
        .is_retryable());
        assert!(!LoadError::warehouse(
            "Numeric value 'abc' is not recognized",
            "COPY INTO T FROM @S"
        )
        .is_retryable());
        assert!(!LoadError::ExportFailed {
            table: "dbo.Nope".into(),
            code: Some(1),
            stdout: "SQLState = S0002, NativeError = 208\nError = Invalid object name 'dbo.Nope'.".into(),
            stderr: String::new(),
        }
        .is_retryable());
    }

    #[test]
    fn test_exit_codes_are_distinct_per_category() {
        assert_eq!(LoadError::Config("x".into()).exit_code(), 2);
        assert_eq!(LoadError::connection("x", "y").exit_code(), 3);
        assert_eq!(LoadError::SchemaNotFound("x".into()).exit_code(), 4);
        assert_eq!(LoadError::MissingOutput(PathBuf::new()).exit_code(), 5);
        assert_eq!(LoadError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_format_detailed_includes_statement() {
        let err = LoadError::warehouse("SQL compilation error", "COPY INTO T FROM @S");
        let detailed = err.format_detailed();
        assert!(detailed.contains("SQL compilation error"));
        assert!(detailed.contains("COPY INTO T FROM @S"));
    }
}
