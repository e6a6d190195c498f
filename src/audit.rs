//! Audit trail
//!
//! Every attempted action ends up here as one immutable entry. Appending is
//! best-effort from the caller's side: a failed append is logged and the
//! triggering operation keeps its outcome.

use crate::db::queries;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use postgres_types::ToSql;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Details column width
pub const MAX_DETAILS_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Failed,
    Pending,
    Approved,
    Draft,
    View,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Failed => "FAILED",
            AuditStatus::Pending => "PENDING",
            AuditStatus::Approved => "APPROVED",
            AuditStatus::Draft => "DRAFT",
            AuditStatus::View => "VIEW",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(AuditStatus::Success),
            "FAILED" => Ok(AuditStatus::Failed),
            "PENDING" => Ok(AuditStatus::Pending),
            "APPROVED" => Ok(AuditStatus::Approved),
            "DRAFT" => Ok(AuditStatus::Draft),
            "VIEW" => Ok(AuditStatus::View),
            other => Err(AppError::Internal(format!("Unknown audit status '{}'", other))),
        }
    }
}

/// One recorded action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub source: String,
    pub status: AuditStatus,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: &str, source: &str, status: AuditStatus, details: impl Into<String>) -> Self {
        let mut details = details.into();
        if details.chars().count() > MAX_DETAILS_LEN {
            details = details.chars().take(MAX_DETAILS_LEN).collect();
        }

        Self {
            id: Uuid::new_v4(),
            action: action.to_string(),
            source: source.to_string(),
            status,
            details,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditTrail: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AppError>;

    /// Newest first
    async fn list(&self, limit: usize) -> Result<Vec<AuditEntry>, AppError>;

    async fn clear(&self) -> Result<u64, AppError>;
}

/// Process-local trail, lost on restart
#[derive(Default)]
pub struct MemoryAuditTrail {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditTrail for MemoryAuditTrail {
    async fn append(&self, entry: AuditEntry) -> Result<(), AppError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<AuditEntry>, AppError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }

    async fn clear(&self) -> Result<u64, AppError> {
        let mut entries = self.entries.write().await;
        let removed = entries.len() as u64;
        entries.clear();
        Ok(removed)
    }
}

/// Trail persisted in the `deployment_history` table
pub struct PgAuditTrail {
    pool: Pool,
}

impl PgAuditTrail {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the history table and index if missing
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        client.batch_execute(queries::CREATE_HISTORY_TABLE).await?;
        client.batch_execute(queries::CREATE_HISTORY_INDEX).await?;
        debug!("deployment_history table ready");
        Ok(())
    }
}

#[async_trait]
impl AuditTrail for PgAuditTrail {
    async fn append(&self, entry: AuditEntry) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        let status = entry.status.as_str();
        let params: [&(dyn ToSql + Sync); 6] = [
            &entry.id,
            &entry.action,
            &entry.source,
            &status,
            &entry.details,
            &entry.timestamp,
        ];
        client.execute(queries::INSERT_HISTORY, &params).await?;
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<AuditEntry>, AppError> {
        let client = self.pool.get().await?;
        let limit = limit as i64;
        let rows = client.query(queries::LIST_HISTORY, &[&limit]).await?;

        rows.iter()
            .map(|row| {
                let status: String = row.get("status");
                Ok(AuditEntry {
                    id: row.get("id"),
                    action: row.get("action"),
                    source: row.get("source"),
                    status: status.parse()?,
                    details: row.get("details"),
                    timestamp: row.get("recorded_at"),
                })
            })
            .collect()
    }

    async fn clear(&self) -> Result<u64, AppError> {
        let client = self.pool.get().await?;
        let removed = client.execute(queries::CLEAR_HISTORY, &[]).await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(AuditStatus::Approved).unwrap(),
            serde_json::json!("APPROVED")
        );
        assert_eq!("VIEW".parse::<AuditStatus>().unwrap(), AuditStatus::View);
        assert!("UNKNOWN".parse::<AuditStatus>().is_err());
    }

    #[test]
    fn test_details_are_capped() {
        let entry = AuditEntry::new("Deploy to Database", "Workflow", AuditStatus::Failed, "x".repeat(2500));
        assert_eq!(entry.details.chars().count(), MAX_DETAILS_LEN);
    }

    #[test]
    fn test_clear_on_empty_trail() {
        let trail = MemoryAuditTrail::new();
        let removed = tokio_test::assert_ok!(tokio_test::block_on(trail.clear()));
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_memory_trail_newest_first() {
        let trail = MemoryAuditTrail::new();
        for action in ["Validate SQL", "Backup Database", "Request Approval"] {
            trail
                .append(AuditEntry::new(action, "Workflow", AuditStatus::Success, ""))
                .await
                .unwrap();
        }

        let listed = trail.list(2).await.unwrap();
        let actions: Vec<&str> = listed.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["Request Approval", "Backup Database"]);

        assert_eq!(trail.clear().await.unwrap(), 3);
        assert!(trail.list(10).await.unwrap().is_empty());
    }
}
