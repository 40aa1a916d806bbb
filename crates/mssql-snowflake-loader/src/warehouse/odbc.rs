//! Snowflake over ODBC (`odbc-api` + the Snowflake ODBC driver).

use super::{QueryResult, Warehouse};
use crate::config::WarehouseConfig;
use crate::error::{LoadError, Result};
use async_trait::async_trait;
use odbc_api::{buffers::TextRowSet, ConnectionOptions, Cursor, Environment, ResultSetMetadata};
use std::sync::Arc;
use tracing::{debug, info};

const BATCH_SIZE: usize = 1000;
const MAX_TEXT_LEN: usize = 4096;

/// Snowflake warehouse reached through ODBC.
pub struct OdbcWarehouse {
    env: Arc<Environment>,
    connection_string: Arc<String>,
}

impl OdbcWarehouse {
    /// Create the ODBC environment and verify that a session can be opened.
    pub async fn connect(config: &WarehouseConfig) -> Result<Self> {
        let env = Environment::new().map_err(|e| {
            LoadError::connection(
                format!(
                    "Failed to create ODBC environment: {}. \
                     Make sure unixODBC and the Snowflake ODBC driver are installed.",
                    e
                ),
                "ODBC environment",
            )
        })?;

        debug!(
            "ODBC connection string (credentials hidden): {}",
            config.redacted_connection_string()
        );

        let warehouse = Self {
            env: Arc::new(env),
            connection_string: Arc::new(config.connection_string()),
        };

        let version = warehouse.query("SELECT CURRENT_VERSION()").await?;
        info!(
            "Connected to Snowflake {}: {}.{} (version {})",
            config.account,
            config.database,
            config.schema,
            version.scalar_string().unwrap_or_default()
        );

        Ok(warehouse)
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Environment, &str) -> Result<T> + Send + 'static,
    {
        let env = Arc::clone(&self.env);
        let conn_str = Arc::clone(&self.connection_string);
        tokio::task::spawn_blocking(move || f(env.as_ref(), conn_str.as_str()))
            .await
            .map_err(|e| LoadError::connection(e.to_string(), "ODBC worker"))?
    }
}

fn open<'e>(env: &'e Environment, conn_str: &str) -> Result<odbc_api::Connection<'e>> {
    env.connect_with_connection_string(conn_str, ConnectionOptions::default())
        .map_err(|e| LoadError::connection(format!("ODBC connection failed: {}", e), "Snowflake"))
}

fn execute_sync(env: &Environment, conn_str: &str, sql: &str) -> Result<()> {
    let conn = open(env, conn_str)?;
    conn.execute(sql, ())
        .map_err(|e| LoadError::warehouse(e.to_string(), sql))?;
    Ok(())
}

fn query_sync(env: &Environment, conn_str: &str, sql: &str) -> Result<QueryResult> {
    let conn = open(env, conn_str)?;
    let mut result = QueryResult::default();

    let cursor = conn
        .execute(sql, ())
        .map_err(|e| LoadError::warehouse(e.to_string(), sql))?;

    if let Some(mut cursor) = cursor {
        let err = |e: odbc_api::Error| LoadError::warehouse(e.to_string(), sql);

        result.columns = cursor
            .column_names()
            .map_err(err)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(err)?;
        let num_cols = result.columns.len();

        let mut buffers =
            TextRowSet::for_cursor(BATCH_SIZE, &mut cursor, Some(MAX_TEXT_LEN)).map_err(err)?;
        let mut row_cursor = cursor.bind_buffer(&mut buffers).map_err(err)?;

        while let Some(batch) = row_cursor.fetch().map_err(err)? {
            for row_idx in 0..batch.num_rows() {
                let row = (0..num_cols)
                    .map(|col_idx| {
                        batch
                            .at(col_idx, row_idx)
                            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
                    })
                    .collect();
                result.rows.push(row);
            }
        }
    }

    Ok(result)
}

#[async_trait]
impl Warehouse for OdbcWarehouse {
    async fn execute(&self, sql: &str) -> Result<()> {
        debug!("Snowflake execute: {}", sql);
        let sql = sql.to_string();
        self.run_blocking(move |env, conn_str| execute_sync(env, conn_str, &sql))
            .await
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        debug!("Snowflake query: {}", sql);
        let sql = sql.to_string();
        self.run_blocking(move |env, conn_str| query_sync(env, conn_str, &sql))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_driver_is_connection_error() {
        let config = WarehouseConfig {
            account: "acct".into(),
            user: "loader".into(),
            password: "secret".into(),
            warehouse: "WH".into(),
            database: "DB".into(),
            schema: "SC".into(),
            driver: "NoSuchSnowflakeDriver".into(),
            ..WarehouseConfig::default()
        };

        let err = match OdbcWarehouse::connect(&config).await {
            Ok(_) => panic!("connected through a driver that does not exist"),
            Err(e) => e,
        };
        assert!(matches!(err, LoadError::Connection { .. }), "{:?}", err);
        assert!(!err.to_string().contains("secret"));
    }
}
