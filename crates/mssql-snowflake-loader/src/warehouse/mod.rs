//! Snowflake warehouse access and the stage/copy load sequence.

mod loader;
#[cfg(feature = "odbc")]
mod odbc;
pub mod sql;
#[cfg(test)]
pub(crate) mod testing;

pub use loader::{parse_copy_result, FileLoadResult, LoadResult, WarehouseLoader};
#[cfg(feature = "odbc")]
pub use odbc::OdbcWarehouse;
pub use sql::{FileFormatOptions, LoadObjects};

use crate::config::WarehouseConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Rows returned by a warehouse statement, as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    /// Position of a column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// First column of the first row parsed as an integer.
    pub fn scalar_i64(&self) -> Option<i64> {
        self.rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_deref())
            .and_then(|v| v.trim().parse().ok())
    }

    /// First column of the first row.
    pub fn scalar_string(&self) -> Option<String> {
        self.rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.clone())
    }
}

/// A SQL endpoint in the warehouse.
///
/// Each call acquires its own connection and releases it before returning.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a statement, discarding any result set.
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Run a statement and collect its result set.
    async fn query(&self, sql: &str) -> Result<QueryResult>;
}

/// Connect to Snowflake through the ODBC driver.
#[cfg(feature = "odbc")]
pub async fn connect(config: &WarehouseConfig) -> Result<Arc<dyn Warehouse>> {
    Ok(Arc::new(OdbcWarehouse::connect(config).await?))
}

/// Connect to Snowflake through the ODBC driver.
#[cfg(not(feature = "odbc"))]
pub async fn connect(config: &WarehouseConfig) -> Result<Arc<dyn Warehouse>> {
    Err(crate::error::LoadError::Config(format!(
        "cannot connect to Snowflake account {}: built without ODBC support \
         (rebuild with --features odbc)",
        config.account
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_result_helpers() {
        let result = QueryResult {
            columns: vec!["COUNT(*)".into()],
            rows: vec![vec![Some(" 42 ".into())]],
        };
        assert_eq!(result.scalar_i64(), Some(42));
        assert_eq!(result.column_index("count(*)"), Some(0));
        assert_eq!(QueryResult::default().scalar_i64(), None);
    }
}
