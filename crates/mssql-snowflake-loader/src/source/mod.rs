//! MSSQL source database operations.

mod types;

pub use types::*;

use crate::config::SourceConfig;
use crate::error::{LoadError, Result};
use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

/// Trait for reading table metadata from the source database.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Read the ordered column list of a table or view.
    async fn introspect(&self, table: &TableRef) -> Result<TableSchema>;

    /// Count rows in a table (dirty read).
    async fn row_count(&self, table: &TableRef) -> Result<i64>;

    /// Return the server version string.
    async fn ping(&self) -> Result<String>;
}

const COLUMNS_QUERY: &str = r#"
    SELECT
        COLUMN_NAME,
        DATA_TYPE,
        CAST(CHARACTER_MAXIMUM_LENGTH AS INT),
        CAST(NUMERIC_PRECISION AS INT),
        CAST(NUMERIC_SCALE AS INT),
        IS_NULLABLE,
        CAST(ORDINAL_POSITION AS INT)
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
    ORDER BY ORDINAL_POSITION
"#;

/// Connection manager for bb8 pool with tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    config: SourceConfig,
}

impl TiberiusConnectionManager {
    fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;

        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Schema introspector backed by a small tiberius pool.
pub struct MssqlSource {
    pool: Pool<TiberiusConnectionManager>,
}

impl MssqlSource {
    /// Connect to SQL Server and verify the connection.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        Self::with_max_connections(config, 2).await
    }

    /// Connect with the given pool size.
    pub async fn with_max_connections(config: &SourceConfig, max_size: u32) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let context = format!("{}:{}/{}", config.host, config.port, config.database);
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .await
            .map_err(|e| LoadError::connection(e.to_string(), context.clone()))?;

        let source = Self { pool };
        // Test connection
        source.ping().await?;

        info!("Connected to MSSQL: {} (pool_size={})", context, max_size);
        Ok(source)
    }

    /// Get a pooled connection.
    async fn get_client(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| LoadError::connection(e.to_string(), "MSSQL pool"))
    }
}

#[async_trait]
impl SchemaSource for MssqlSource {
    async fn introspect(&self, table: &TableRef) -> Result<TableSchema> {
        let mut client = self.get_client().await?;

        let mut query = Query::new(COLUMNS_QUERY);
        query.bind(table.schema.as_str());
        query.bind(table.name.as_str());

        let stream = query.query(&mut client).await?;
        let rows = stream.into_first_result().await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(Column {
                name: row.try_get::<&str, _>(0)?.unwrap_or_default().to_string(),
                data_type: row.try_get::<&str, _>(1)?.unwrap_or_default().to_string(),
                max_length: row.try_get::<i32, _>(2)?,
                precision: row.try_get::<i32, _>(3)?,
                scale: row.try_get::<i32, _>(4)?,
                is_nullable: row
                    .try_get::<&str, _>(5)?
                    .map(|v| v.eq_ignore_ascii_case("YES"))
                    .unwrap_or(true),
                ordinal_pos: row.try_get::<i32, _>(6)?.unwrap_or(0),
            });
        }

        debug!("Loaded {} columns for {}", columns.len(), table);
        TableSchema::new(table.clone(), columns)
    }

    async fn row_count(&self, table: &TableRef) -> Result<i64> {
        let mut client = self.get_client().await?;
        let sql = format!("SELECT COUNT_BIG(*) FROM {} WITH (NOLOCK)", table.quoted());

        let row = client.simple_query(sql).await?.into_row().await?;
        let count = match row {
            Some(row) => row.try_get::<i64, _>(0)?.unwrap_or(0),
            None => 0,
        };

        debug!("Row count for {}: {}", table, count);
        Ok(count)
    }

    async fn ping(&self) -> Result<String> {
        let mut client = self.get_client().await?;
        let row = client.simple_query("SELECT @@VERSION").await?.into_row().await?;
        let version = match row {
            Some(row) => row
                .try_get::<&str, _>(0)?
                .unwrap_or_default()
                .lines()
                .next()
                .unwrap_or_default()
                .to_string(),
            None => String::new(),
        };
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_query_orders_by_ordinal() {
        assert!(COLUMNS_QUERY.contains("INFORMATION_SCHEMA.COLUMNS"));
        assert!(COLUMNS_QUERY.trim_end().ends_with("ORDER BY ORDINAL_POSITION"));
    }

    #[test]
    fn test_manager_config_uses_port() {
        let config = SourceConfig {
            host: "sqlhost".into(),
            port: 14330,
            database: "ERP".into(),
            user: "reader".into(),
            password: "pw".into(),
            ..SourceConfig::default()
        };
        let manager = TiberiusConnectionManager::new(config);
        assert_eq!(manager.build_config().get_addr(), "sqlhost:14330");
    }
}
