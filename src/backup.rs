//! Backup collaborators
//!
//! The backup stage only needs "make a backup, tell me where it is". Two
//! strategies are available, picked by `BACKUP_STRATEGY`.

use crate::config::{DatabaseConfig, DeploymentConfig};
use crate::db::queries::SqlBuilder;
use crate::db::Database;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

#[async_trait]
pub trait BackupProvider: Send + Sync {
    /// Create a backup and return its identifier (file path or schema name)
    async fn create_backup(&self) -> Result<String, AppError>;
}

/// Full dump to a timestamped file with the external `pg_dump` utility
pub struct PgDumpBackup {
    pg_dump_path: String,
    backup_dir: PathBuf,
    database: DatabaseConfig,
}

impl PgDumpBackup {
    pub fn new(deployment: &DeploymentConfig, database: DatabaseConfig) -> Self {
        Self {
            pg_dump_path: deployment.pg_dump_path.clone(),
            backup_dir: deployment.backup_dir.clone(),
            database,
        }
    }

    /// `<dir>/<database>_<YYYY-MM-DD_HH-MM-SS>.sql`
    pub fn backup_file(dir: &Path, database: &str, at: DateTime<Local>) -> PathBuf {
        dir.join(format!("{}_{}.sql", database, at.format("%Y-%m-%d_%H-%M-%S")))
    }

    async fn is_available(&self) -> bool {
        match Command::new(&self.pg_dump_path).arg("--version").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl BackupProvider for PgDumpBackup {
    async fn create_backup(&self) -> Result<String, AppError> {
        if !self.is_available().await {
            return Err(AppError::Backup(format!(
                "{} not detected. Install the PostgreSQL client tools or set PG_DUMP_PATH.",
                self.pg_dump_path
            )));
        }

        tokio::fs::create_dir_all(&self.backup_dir).await.map_err(|e| {
            AppError::Backup(format!(
                "Cannot create backup directory {}: {}",
                self.backup_dir.display(),
                e
            ))
        })?;

        let file = Self::backup_file(&self.backup_dir, &self.database.database, Local::now());
        debug!("Running {} into {}", self.pg_dump_path, file.display());

        let mut command = Command::new(&self.pg_dump_path);
        command
            .arg("--host")
            .arg(&self.database.host)
            .arg("--port")
            .arg(self.database.port.to_string())
            .arg("--username")
            .arg(&self.database.user)
            .arg("--no-password")
            .arg("--file")
            .arg(&file)
            .arg(&self.database.database)
            // Password travels through the environment, never argv
            .env("PGPASSWORD", &self.database.password);
        if self.database.require_tls {
            command.env("PGSSLMODE", "require");
        }

        let output = command
            .output()
            .await
            .map_err(|e| AppError::Backup(format!("Failed to start {}: {}", self.pg_dump_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(AppError::Backup(format!(
                "Backup failed with exit code {}: {}",
                code,
                stderr.trim()
            )));
        }

        let path = file.display().to_string();
        info!("💾 Database backup written to {}", path);
        Ok(path)
    }
}

/// In-database copy of every table into `<schema>_backup`
pub struct SchemaCopyBackup {
    db: Arc<dyn Database>,
    schema: String,
}

impl SchemaCopyBackup {
    pub fn new(db: Arc<dyn Database>, schema: impl Into<String>) -> Self {
        Self {
            db,
            schema: schema.into(),
        }
    }

    pub fn backup_schema(&self) -> String {
        format!("{}_backup", self.schema)
    }
}

#[async_trait]
impl BackupProvider for SchemaCopyBackup {
    async fn create_backup(&self) -> Result<String, AppError> {
        let target = self.backup_schema();
        let tables: BTreeSet<String> = self
            .db
            .column_metadata(&self.schema)
            .await?
            .into_iter()
            .map(|c| c.table)
            .collect();

        let wrap = |e: AppError| AppError::Backup(e.detail());

        self.db
            .execute(&SqlBuilder::create_schema(&target))
            .await
            .map_err(wrap)?;

        for table in &tables {
            self.db
                .execute(&SqlBuilder::drop_table_if_exists(&target, table))
                .await
                .map_err(wrap)?;
            self.db
                .execute(&SqlBuilder::create_table_like(&target, &self.schema, table))
                .await
                .map_err(wrap)?;
            self.db
                .execute(&SqlBuilder::copy_rows(&target, &self.schema, table))
                .await
                .map_err(wrap)?;
        }

        info!("💾 Copied {} table(s) from '{}' into '{}'", tables.len(), self.schema, target);
        Ok(target)
    }
}
