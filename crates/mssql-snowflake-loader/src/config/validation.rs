//! Configuration validation.

use super::Config;
use crate::error::{LoadError, Result};
use crate::schedule::DailyTrigger;
use std::collections::HashSet;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(LoadError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(LoadError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(LoadError::Config("source.user is required".into()));
    }

    // Warehouse validation
    for (field, value) in [
        ("warehouse.account", &config.warehouse.account),
        ("warehouse.user", &config.warehouse.user),
        ("warehouse.warehouse", &config.warehouse.warehouse),
        ("warehouse.database", &config.warehouse.database),
        ("warehouse.schema", &config.warehouse.schema),
    ] {
        if value.is_empty() {
            return Err(LoadError::Config(format!("{} is required", field)));
        }
    }

    // Export validation
    if config.export.delimiter.is_empty() {
        return Err(LoadError::Config(
            "export.delimiter cannot be empty".into(),
        ));
    }
    if config.export.row_terminator.is_empty() {
        return Err(LoadError::Config(
            "export.row_terminator cannot be empty".into(),
        ));
    }
    if config.export.default_row_cap == 0 {
        return Err(LoadError::Config(
            "export.default_row_cap must be at least 1".into(),
        ));
    }
    if config.export.batch_size == 0 {
        return Err(LoadError::Config(
            "export.batch_size must be at least 1".into(),
        ));
    }

    if config.retry.max_attempts == 0 {
        return Err(LoadError::Config(
            "retry.max_attempts must be at least 1".into(),
        ));
    }

    // Job validation
    let mut names = HashSet::new();
    for job in config.effective_jobs() {
        if job.name.trim().is_empty() {
            return Err(LoadError::Config("job name cannot be empty".into()));
        }
        if !names.insert(job.name.to_lowercase()) {
            return Err(LoadError::Config(format!(
                "duplicate job name '{}'",
                job.name
            )));
        }
        if job.source_table.trim().is_empty() || job.target_table.trim().is_empty() {
            return Err(LoadError::Config(format!(
                "job '{}' needs both source_table and target_table",
                job.name
            )));
        }
        if let Some(0) = job.row_cap {
            return Err(LoadError::Config(format!(
                "job '{}': row_cap must be at least 1",
                job.name
            )));
        }
        if let Some(ddl) = &job.columns_ddl {
            if ddl.trim().is_empty() {
                return Err(LoadError::Config(format!(
                    "job '{}': columns_ddl is empty",
                    job.name
                )));
            }
        }
        DailyTrigger::parse(&job.schedule).map_err(|e| {
            LoadError::Config(format!("job '{}': {}", job.name, e))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JobConfig, SourceConfig, WarehouseConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                host: "localhost".to_string(),
                database: "ERP".to_string(),
                user: "sa".to_string(),
                password: "password".to_string(),
                ..SourceConfig::default()
            },
            warehouse: WarehouseConfig {
                account: "xy12345".to_string(),
                user: "loader".to_string(),
                password: "password".to_string(),
                warehouse: "COMPUTE_WH".to_string(),
                database: "ANALYTICS".to_string(),
                schema: "BRONZE".to_string(),
                ..WarehouseConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_warehouse_schema() {
        let mut config = valid_config();
        config.warehouse.schema = "".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("warehouse.schema"));
    }

    #[test]
    fn test_empty_delimiter_rejected() {
        let mut config = valid_config();
        config.export.delimiter = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let mut config = valid_config();
        config.retry.max_attempts = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_job_names_rejected() {
        let mut config = valid_config();
        config.jobs = vec![
            JobConfig::new("orders", "dbo.Orders", "ORDERS"),
            JobConfig::new("Orders", "dbo.Orders2", "ORDERS2"),
        ];
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate job name"));
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let mut config = valid_config();
        let mut job = JobConfig::new("orders", "dbo.Orders", "ORDERS");
        job.schedule = "*/5 * * * *".to_string();
        config.jobs = vec![job];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }

    #[test]
    fn test_warehouse_config_debug_redacts_password() {
        let mut config = valid_config();
        config.warehouse.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }
}
