//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MSSQL).
    #[serde(default)]
    pub source: SourceConfig,

    /// Destination warehouse configuration (Snowflake).
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// bcp export behavior.
    #[serde(default)]
    pub export: ExportConfig,

    /// Stage/COPY behavior.
    #[serde(default)]
    pub load: LoadConfig,

    /// Bounded retry applied to each pipeline step.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Job definitions. Empty means the built-in job set.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,

    /// JSON ledger recording the last outcome of every job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

impl Config {
    /// Jobs to run: the configured ones, or the built-in set when none are listed.
    pub fn effective_jobs(&self) -> Vec<JobConfig> {
        if self.jobs.is_empty() {
            default_jobs()
        } else {
            self.jobs.clone()
        }
    }

    /// Look up a job by name (case-insensitive).
    pub fn job(&self, name: &str) -> Option<JobConfig> {
        self.effective_jobs()
            .into_iter()
            .find(|j| j.name.eq_ignore_ascii_case(name))
    }
}

/// Source database (MSSQL) configuration.
///
/// Every field has a default so credentials may come from the environment
/// alone; validation rejects whatever is still missing.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Schema used for unqualified table names (default: "dbo").
    pub schema: String,

    /// Encrypt connection (default: true).
    pub encrypt: bool,

    /// Trust server certificate (default: true).
    pub trust_server_cert: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mssql_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            schema: default_dbo_schema(),
            encrypt: true,
            trust_server_cert: true,
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Destination warehouse (Snowflake) configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Account identifier (e.g. "xy12345.eu-west-1").
    pub account: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Compute warehouse.
    pub warehouse: String,

    /// Target database.
    pub database: String,

    /// Target schema.
    pub schema: String,

    /// Role to assume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// ODBC driver name (default: "SnowflakeDSIIDriver").
    pub driver: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            user: String::new(),
            password: String::new(),
            warehouse: String::new(),
            database: String::new(),
            schema: String::new(),
            role: None,
            driver: default_snowflake_driver(),
        }
    }
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("role", &self.role)
            .field("driver", &self.driver)
            .finish()
    }
}

/// bcp export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Path to the bcp executable. Defaults to `bcp`, or the mssql-tools
    /// location when running through WSL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcp_path: Option<String>,

    /// Run bcp through `wsl` and translate Windows paths (default: false).
    #[serde(default)]
    pub use_wsl: bool,

    /// Directory receiving one `<job>.csv` per job.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Field delimiter (default: ",").
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Row terminator in bcp escape notation (default: `\n`, passed as
    /// backslash-n).
    #[serde(default = "default_row_terminator")]
    pub row_terminator: String,

    /// Rows per bcp batch (`-b`).
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Network packet size in bytes (`-a`).
    #[serde(default = "default_packet_size")]
    pub packet_size: u32,

    /// Row cap applied when a job does not set its own.
    #[serde(default = "default_row_cap")]
    pub default_row_cap: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            bcp_path: None,
            use_wsl: false,
            output_dir: default_output_dir(),
            delimiter: default_delimiter(),
            row_terminator: default_row_terminator(),
            batch_size: default_batch_size(),
            packet_size: default_packet_size(),
            default_row_cap: default_row_cap(),
        }
    }
}

impl ExportConfig {
    /// Effective bcp executable.
    pub fn bcp_program(&self) -> String {
        match &self.bcp_path {
            Some(path) => path.clone(),
            None if self.use_wsl => "/opt/mssql-tools/bin/bcp".to_string(),
            None => "bcp".to_string(),
        }
    }
}

/// Stage and COPY configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Header lines to skip. bcp character mode writes none (default: 0).
    #[serde(default)]
    pub skip_header: u32,

    /// Optional field enclosure character (default: '"').
    #[serde(default = "default_quote")]
    pub quote_char: char,

    /// Tokens loaded as NULL.
    #[serde(default = "default_null_if")]
    pub null_if: Vec<String>,

    /// Load empty fields as NULL (default: true).
    #[serde(default = "default_true")]
    pub empty_field_as_null: bool,

    /// Fail rows whose column count differs from the table (default: true).
    #[serde(default = "default_true")]
    pub error_on_column_count_mismatch: bool,

    /// Per-row error policy for COPY (default: abort).
    #[serde(default)]
    pub on_error: OnError,

    /// Remove staged files after a successful COPY (default: true).
    #[serde(default = "default_true")]
    pub purge: bool,

    /// Compress files during PUT (default: true).
    #[serde(default = "default_true")]
    pub auto_compress: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            skip_header: 0,
            quote_char: default_quote(),
            null_if: default_null_if(),
            empty_field_as_null: true,
            error_on_column_count_mismatch: true,
            on_error: OnError::default(),
            purge: true,
            auto_compress: true,
        }
    }
}

/// COPY INTO per-row error policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Abort the whole statement on the first bad row.
    #[default]
    Abort,

    /// Skip bad rows and keep loading.
    Continue,
}

/// Bounded retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per step including the first; 1 disables retry (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay in seconds; attempt n waits `n * delay_secs` (default: 5).
    #[serde(default = "default_retry_delay")]
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_retry_delay(),
        }
    }
}

/// How the target table is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// `CREATE OR REPLACE TABLE`: every run starts from an empty table.
    #[default]
    OrReplace,

    /// `CREATE TABLE IF NOT EXISTS`: rows accumulate across runs.
    IfNotExists,
}

/// Nullability rendering for generated columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullabilityMode {
    /// Nullable columns get ` NULL`, NOT NULL columns get no constraint.
    #[default]
    Relaxed,

    /// NOT NULL source columns are emitted as ` NOT NULL`.
    Strict,
}

/// One scheduled extract-load job (one source table -> one target table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job name; also scopes the stage and file format names.
    pub name: String,

    /// Source table or view, optionally schema-qualified.
    pub source_table: String,

    /// Target table in the warehouse database/schema.
    pub target_table: String,

    /// Daily trigger in cron form `M H * * *` (default: midnight UTC).
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Explicit export query; defaults to `SELECT TOP <row_cap> * ... WITH (NOLOCK)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Row cap for the generated export query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_cap: Option<u64>,

    /// Target table creation mode.
    #[serde(default)]
    pub create_mode: CreateMode,

    /// Nullability rendering.
    #[serde(default)]
    pub nullability: NullabilityMode,

    /// Column name -> Snowflake type, replacing the mapped type.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub column_overrides: BTreeMap<String, String>,

    /// Hand-written column block used instead of introspection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns_ddl: Option<String>,

    /// Disabled jobs are skipped by `run` and `schedule`.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl JobConfig {
    /// Create a job with default settings.
    pub fn new(
        name: impl Into<String>,
        source_table: impl Into<String>,
        target_table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_table: source_table.into(),
            target_table: target_table.into(),
            schedule: default_schedule(),
            query: None,
            row_cap: None,
            create_mode: CreateMode::default(),
            nullability: NullabilityMode::default(),
            column_overrides: BTreeMap::new(),
            columns_ddl: None,
            enabled: true,
        }
    }

    fn with_overrides(mut self, overrides: &[(&str, &str)]) -> Self {
        for (column, ty) in overrides {
            self.column_overrides
                .insert((*column).to_string(), (*ty).to_string());
        }
        self
    }
}

/// Jobs deployed when the configuration lists none.
pub fn default_jobs() -> Vec<JobConfig> {
    vec![
        JobConfig::new("equipment", "dbo.V_Equipment", "AI_V_Equipment").with_overrides(&[
            ("Eqcat_Part_Sales_Previous_12m", "NUMBER(38,6)"),
            ("Eqcat_Labor_Sales_Previous_12m", "NUMBER(38,6)"),
            ("Eqcat_Total_Sales_Previous_12m", "NUMBER(38,6)"),
            ("Eqcat_Part_Opportunity_Previous_12m", "NUMBER(38,6)"),
            ("Eqcat_Labor_Opportunity_Previous_12m", "NUMBER(38,6)"),
            ("Eqcat_Total_Opportunity_Previous_12m", "NUMBER(38,6)"),
            ("Eqcat_Part_Opportunity_Future_12m", "NUMBER(38,6)"),
            ("Eqcat_Labor_Opportunity_Future_12m", "NUMBER(38,6)"),
            ("Eqcat_Total_Opportunity_Future_12m", "NUMBER(38,6)"),
            ("Eqcat_Boost_Previous_12m", "NUMBER(38,3)"),
            ("Eqcat_Base_Previous_12_m", "NUMBER(38,6)"),
            ("Eqcat_Base_Future_12_m", "NUMBER(38,6)"),
            ("Op_Cat_Labor_Hours", "NUMBER(38,0)"),
            ("Op_Cat_Labor_Value", "NUMBER(38,0)"),
            ("Op_Cat_Base", "NUMBER(38,0)"),
            ("Op_Cat_Total_Value", "NUMBER(38,0)"),
            ("Op_Cat_Confidence_Index_pctg", "NUMBER(38,0)"),
        ]),
        JobConfig::new(
            "facture_dashboard",
            "dbo.V_facture_dashboard_am",
            "AI_V_facture_dashboard_am",
        )
        .with_overrides(&[
            ("gfd_prix_unitaire_achat_euro", "NUMBER(38,6)"),
            ("gfd_prix_unitaire_vente_euros", "NUMBER(38,6)"),
            ("gfd_quantite", "NUMBER(38,6)"),
            ("gfd_montant_achat_euros", "NUMBER(38,6)"),
            ("gfd_montant_vente_euros", "NUMBER(38,6)"),
            ("gfd_montant_vente_devise_locale", "NUMBER(38,6)"),
        ]),
        JobConfig::new(
            "tiers_dashboard",
            "dbo.V_tiers_dashboard_am",
            "AI_V_tiers_dashboard_am",
        ),
        JobConfig::new(
            "inventory_parts_ops",
            "dbo.v_Inventory_Parts_Ops",
            "AI_V_Inventory_Parts_Ops",
        )
        .with_overrides(&[
            ("Age_Stock", "NUMBER(38,6)"),
            ("Qte_En_Stock", "NUMBER(38,6)"),
        ]),
    ]
}

// Default value functions for serde
fn default_mssql_port() -> u16 {
    1433
}

fn default_dbo_schema() -> String {
    "dbo".to_string()
}

fn default_snowflake_driver() -> String {
    "SnowflakeDSIIDriver".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/tmp/mssql_export")
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_row_terminator() -> String {
    r"\n".to_string()
}

fn default_batch_size() -> u32 {
    100_000
}

fn default_packet_size() -> u32 {
    32_767
}

fn default_row_cap() -> u64 {
    10_000_000
}

fn default_quote() -> char {
    '"'
}

fn default_null_if() -> Vec<String> {
    vec!["NULL".to_string(), String::new()]
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

pub(crate) fn default_schedule() -> String {
    "0 0 * * *".to_string()
}

fn default_true() -> bool {
    true
}
