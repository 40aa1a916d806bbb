//! # mssql-snowflake-loader
//!
//! Scheduled bulk loader from Microsoft SQL Server into Snowflake.
//!
//! Each configured job moves one source table or view:
//!
//! - **Bulk export** with the `bcp` utility into a delimited text file
//! - **DDL generation** from the SQL Server catalog with type mapping
//! - **Stage upload** with `PUT` and **bulk load** with `COPY INTO`
//! - **Bounded retries** per step and a JSON run ledger
//! - **Daily triggers** for unattended operation
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_snowflake_loader::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mssql_snowflake_loader::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let summary = orchestrator.run(&[], CancellationToken::new()).await?;
//!     println!("Loaded {} rows", summary.rows_loaded);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod ddl;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod pipeline;
pub mod schedule;
pub mod source;
pub mod state;
pub mod typemap;
pub mod warehouse;

// Re-exports for convenient access
pub use config::{Config, JobConfig, SourceConfig, WarehouseConfig};
pub use error::{LoadError, Result};
pub use orchestrator::{health_check, job_status, HealthCheckResult, Orchestrator, RunSummary};
pub use pipeline::{JobPlan, JobResult};
pub use schedule::{DailyTrigger, Scheduler};
pub use state::{JobRecord, JobStatus, RunLedger};
