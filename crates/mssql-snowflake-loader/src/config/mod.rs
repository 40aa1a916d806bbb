//! Configuration loading, environment overrides and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{LoadError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

impl Config {
    /// Load configuration from a YAML file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string (no environment overrides).
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration purely from environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay values found through `lookup` (normally `std::env::var`).
    ///
    /// Empty values are ignored so an exported-but-blank variable does not
    /// wipe a value from the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MSSQL_SERVER") {
            self.source.host = v;
        }
        if let Some(v) = get("MSSQL_PORT") {
            match v.trim().parse() {
                Ok(port) => self.source.port = port,
                Err(_) => debug!("Ignoring non-numeric MSSQL_PORT value"),
            }
        }
        if let Some(v) = get("MSSQL_DATABASE") {
            self.source.database = v;
        }
        if let Some(v) = get("MSSQL_USER") {
            self.source.user = v;
        }
        if let Some(v) = get("MSSQL_PASSWORD") {
            self.source.password = v;
        }
        if let Some(v) = get("MSSQL_SCHEMA") {
            self.source.schema = v;
        }
        if let Some(v) = get("BCP_PATH") {
            self.export.bcp_path = Some(v);
        }
        if let Some(v) = get("USE_WSL") {
            self.export.use_wsl = parse_flag(&v);
        }
        if let Some(v) = get("OUTPUT_DIR") {
            self.export.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SNOWFLAKE_ACCOUNT") {
            self.warehouse.account = v;
        }
        if let Some(v) = get("SNOWFLAKE_USER") {
            self.warehouse.user = v;
        }
        if let Some(v) = get("SNOWFLAKE_PASSWORD") {
            self.warehouse.password = v;
        }
        if let Some(v) = get("SNOWFLAKE_WAREHOUSE") {
            self.warehouse.warehouse = v;
        }
        if let Some(v) = get("SNOWFLAKE_DATABASE") {
            self.warehouse.database = v;
        }
        if let Some(v) = get("SNOWFLAKE_SCHEMA") {
            self.warehouse.schema = v;
        }
        if let Some(v) = get("SNOWFLAKE_ROLE") {
            self.warehouse.role = Some(v);
        }
        if let Some(v) = get("SNOWFLAKE_DRIVER") {
            self.warehouse.driver = v;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Output file for a job: `<output_dir>/<job>.csv`.
    pub fn output_path(&self, job: &JobConfig) -> PathBuf {
        self.export.output_dir.join(format!("{}.csv", job.name))
    }
}

impl SourceConfig {
    /// Server argument for bcp's `-S` flag.
    pub fn bcp_server(&self) -> String {
        if self.port == 1433 {
            self.host.clone()
        } else {
            format!("{},{}", self.host, self.port)
        }
    }
}

impl WarehouseConfig {
    /// ODBC connection string for the Snowflake driver.
    pub fn connection_string(&self) -> String {
        let mut conn = format!(
            "Driver={{{}}};Server={}.snowflakecomputing.com;uid={};pwd={};warehouse={};database={};schema={};",
            self.driver,
            self.account,
            self.user,
            self.password,
            self.warehouse,
            self.database,
            self.schema
        );
        if let Some(role) = &self.role {
            conn.push_str(&format!("role={};", role));
        }
        conn
    }

    /// Connection string with credentials removed, for logging.
    pub fn redacted_connection_string(&self) -> String {
        format!(
            "Driver={{{}}};Server={}.snowflakecomputing.com;uid={};pwd=***;warehouse={};database={};schema={};",
            self.driver, self.account, self.user, self.warehouse, self.database, self.schema
        )
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "yes" | "1" | "on"
    )
}

/// Map a missing-file error on the config path to a config error with a hint.
pub fn missing_config(path: &Path) -> LoadError {
    LoadError::Config(format!(
        "configuration file {:?} not found (omit --config to read settings from the environment)",
        path
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const YAML: &str = r#"
source:
  host: sqlhost
  database: ERP
  user: reader
  password: secret
warehouse:
  account: xy12345.eu-west-1
  user: loader
  password: sf-secret
  warehouse: COMPUTE_WH
  database: ANALYTICS
  schema: EQUIPEMENT
  role: TRANSFORM
jobs:
  - name: localisation
    source_table: dbo.VLinkLocalisation
    target_table: a_bronze_vlinklocalisation
    row_cap: 500
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.source.port, 1433);
        assert_eq!(config.source.schema, "dbo");
        assert_eq!(config.export.delimiter, ",");
        assert_eq!(config.export.default_row_cap, 10_000_000);
        assert_eq!(config.load.on_error, OnError::Abort);
        assert!(config.load.purge);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.warehouse.driver, "SnowflakeDSIIDriver");

        let job = config.job("LOCALISATION").unwrap();
        assert_eq!(job.schedule, "0 0 * * *");
        assert_eq!(job.row_cap, Some(500));
        assert_eq!(job.create_mode, CreateMode::OrReplace);
        assert!(job.enabled);
    }

    #[test]
    fn test_env_overrides_replace_file_values() {
        let mut config = Config::from_yaml(YAML).unwrap();
        let env: HashMap<&str, &str> = [
            ("MSSQL_SERVER", "other-host"),
            ("MSSQL_PORT", "14330"),
            ("SNOWFLAKE_PASSWORD", "rotated"),
            ("USE_WSL", "TRUE"),
            ("SNOWFLAKE_SCHEMA", ""),
        ]
        .into_iter()
        .collect();

        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.source.host, "other-host");
        assert_eq!(config.source.port, 14330);
        assert_eq!(config.warehouse.password, "rotated");
        assert!(config.export.use_wsl);
        // Blank values do not clobber
        assert_eq!(config.warehouse.schema, "EQUIPEMENT");
    }

    #[test]
    fn test_env_only_config() {
        let mut config = Config::default();
        let env: HashMap<&str, &str> = [
            ("MSSQL_SERVER", "sqlhost"),
            ("MSSQL_DATABASE", "ERP"),
            ("MSSQL_USER", "reader"),
            ("MSSQL_PASSWORD", "pw"),
            ("SNOWFLAKE_ACCOUNT", "acct"),
            ("SNOWFLAKE_USER", "u"),
            ("SNOWFLAKE_PASSWORD", "p"),
            ("SNOWFLAKE_WAREHOUSE", "WH"),
            ("SNOWFLAKE_DATABASE", "DB"),
            ("SNOWFLAKE_SCHEMA", "SC"),
        ]
        .into_iter()
        .collect();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert!(config.validate().is_ok());
        assert_eq!(config.effective_jobs().len(), 4);
    }

    #[test]
    fn test_bcp_server_includes_non_default_port() {
        let mut source = SourceConfig {
            host: "sqlhost".into(),
            ..SourceConfig::default()
        };
        assert_eq!(source.bcp_server(), "sqlhost");
        source.port = 14330;
        assert_eq!(source.bcp_server(), "sqlhost,14330");
    }

    #[test]
    fn test_connection_string_redaction() {
        let config = Config::from_yaml(YAML).unwrap();
        let full = config.warehouse.connection_string();
        let redacted = config.warehouse.redacted_connection_string();
        assert!(full.contains("pwd=sf-secret;"));
        assert!(full.contains("role=TRANSFORM;"));
        assert!(full.contains("Server=xy12345.eu-west-1.snowflakecomputing.com"));
        assert!(!redacted.contains("sf-secret"));
        assert!(redacted.contains("pwd=***"));
    }

    #[test]
    fn test_output_path_is_job_scoped() {
        let config = Config::from_yaml(YAML).unwrap();
        let job = config.job("localisation").unwrap();
        assert_eq!(
            config.output_path(&job),
            PathBuf::from("/tmp/mssql_export/localisation.csv")
        );
    }
}
