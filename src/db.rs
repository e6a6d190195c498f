//! Database collaborator
//!
//! Everything the deployment core needs from the target database sits behind
//! the [`Database`] trait: column metadata for snapshots, plain execution for
//! DDL, counted execution for DML and row results for previews.

pub mod queries;

use crate::config::DatabaseConfig;
use crate::error::AppError;
use crate::snapshot::ColumnDescriptor;
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use serde_json::{Map, Value};
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// One result row keyed by column name
pub type JsonRow = Map<String, Value>;

/// Target database operations consumed by the workflow
#[async_trait]
pub trait Database: Send + Sync {
    /// Column metadata for one schema, ordered by table then ordinal position
    async fn column_metadata(&self, schema: &str) -> Result<Vec<ColumnDescriptor>, AppError>;

    /// Execute SQL for effect only
    async fn execute(&self, sql: &str) -> Result<(), AppError>;

    /// Execute SQL and return the affected-row count
    async fn execute_counted(&self, sql: &str) -> Result<u64, AppError>;

    /// Run a query and return at most `limit` rows
    async fn query_rows(&self, sql: &str, limit: usize) -> Result<Vec<JsonRow>, AppError>;

    /// Ask the planner to explain a statement without running it
    async fn explain(&self, sql: &str) -> Result<(), AppError> {
        self.execute(&format!("EXPLAIN {}", sql)).await
    }
}

/// Pool-backed PostgreSQL implementation
#[derive(Clone)]
pub struct PgDatabase {
    pool: Pool,
}

impl PgDatabase {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a connection pool with given configuration
    pub fn create_pool(config: &DatabaseConfig) -> Result<Pool, AppError> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.user = Some(config.user.clone());
        cfg.password = Some(config.password.clone());
        cfg.dbname = Some(config.database.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(config.max_pool_size));

        let pool = if config.require_tls {
            let certs = rustls_native_certs::load_native_certs();
            let mut root_store = rustls::RootCertStore::empty();
            for cert in certs.certs {
                root_store.add(cert).ok();
            }

            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
            cfg.create_pool(Some(Runtime::Tokio1), tls)
        } else {
            cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        };

        let pool = pool.map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))?;
        info!(
            "Connection pool configured for {}@{}:{}/{} (TLS: {})",
            config.user, config.host, config.port, config.database, config.require_tls
        );
        Ok(pool)
    }

    /// Verify the pool can reach the server
    pub async fn ping(&self) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        client.query_one(queries::PING, &[]).await?;
        Ok(())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn column_metadata(&self, schema: &str) -> Result<Vec<ColumnDescriptor>, AppError> {
        let client = self.pool.get().await?;
        let rows = client.query(queries::COLUMN_METADATA, &[&schema]).await?;

        let columns: Vec<ColumnDescriptor> = rows
            .iter()
            .map(|row| ColumnDescriptor {
                table: row.get("table_name"),
                column: row.get("column_name"),
                data_type: row.get("column_type"),
                nullable: row.get::<_, String>("is_nullable") == "YES",
                default_value: row.get("column_default"),
            })
            .collect();

        debug!("Read {} column descriptors from schema '{}'", columns.len(), schema);
        Ok(columns)
    }

    async fn execute(&self, sql: &str) -> Result<(), AppError> {
        // Extended protocol: a fragment holding more than one command is rejected
        let client = self.pool.get().await?;
        client.execute(sql, &[]).await?;
        Ok(())
    }

    async fn execute_counted(&self, sql: &str) -> Result<u64, AppError> {
        let client = self.pool.get().await?;
        let affected = client.execute(sql, &[]).await?;
        Ok(affected)
    }

    async fn query_rows(&self, sql: &str, limit: usize) -> Result<Vec<JsonRow>, AppError> {
        let client = self.pool.get().await?;
        let wrapped = queries::wrap_row_to_json(sql, limit);
        let rows = client.query(wrapped.as_str(), &[]).await?;

        rows.iter()
            .map(|row| {
                let raw: String = row.get(0);
                match serde_json::from_str::<Value>(&raw) {
                    Ok(Value::Object(map)) => Ok(map),
                    Ok(other) => Err(AppError::Internal(format!(
                        "Expected a JSON object per row, got {}",
                        other
                    ))),
                    Err(e) => Err(AppError::Internal(format!("Failed to decode row: {}", e))),
                }
            })
            .collect()
    }
}
