//! Schema Snapshot Store
//!
//! Reads table/column metadata from the target database and folds it into an
//! immutable snapshot. Think of this as a "git commit" of the schema taken
//! right before and right after a deployment.

use crate::db::Database;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

/// One column as reported by the metadata query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub table: String,
    pub column: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    /// Empty when the column has no default
    pub default_value: String,
}

impl ColumnDescriptor {
    pub fn new(table: &str, column: &str, data_type: &str, nullable: bool, default_value: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            data_type: data_type.to_string(),
            nullable,
            default_value: default_value.to_string(),
        }
    }

    /// Stable identity key: `table.column`
    pub fn key(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }

    /// The part of a column that a diff compares
    pub fn signature(&self) -> (&str, bool, &str) {
        (&self.data_type, self.nullable, &self.default_value)
    }

    pub fn same_definition(&self, other: &ColumnDescriptor) -> bool {
        self.signature() == other.signature()
    }

    /// `type NULL|NOT NULL [DEFAULT x]`
    pub fn describe_definition(&self) -> String {
        let mut out = format!(
            "{} {}",
            self.data_type,
            if self.nullable { "NULL" } else { "NOT NULL" }
        );
        if !self.default_value.is_empty() {
            out.push_str(&format!(" DEFAULT {}", self.default_value));
        }
        out
    }
}

/// Point-in-time capture of one schema's tables and columns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    pub schema: String,
    pub captured_at: DateTime<Utc>,
    pub tables: BTreeSet<String>,
    /// Keyed by `table.column`
    pub columns: BTreeMap<String, ColumnDescriptor>,
    pub checksum: String,
}

impl SchemaSnapshot {
    /// Fold metadata rows into a snapshot
    pub fn from_columns(schema: &str, rows: Vec<ColumnDescriptor>) -> Self {
        let mut tables = BTreeSet::new();
        let mut columns = BTreeMap::new();

        for column in rows {
            tables.insert(column.table.clone());
            columns.insert(column.key(), column);
        }

        let checksum = Self::compute_checksum(&columns);

        Self {
            schema: schema.to_string(),
            captured_at: Utc::now(),
            tables,
            columns,
            checksum,
        }
    }

    /// Compute checksum from schema content. Keys are already sorted.
    pub fn compute_checksum(columns: &BTreeMap<String, ColumnDescriptor>) -> String {
        let mut hasher = Sha256::new();
        for (key, col) in columns {
            hasher.update(
                format!(
                    "{}:{}|{}|{}\n",
                    key, col.data_type, col.nullable, col.default_value
                )
                .as_bytes(),
            );
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    /// Columns of one table, in key order
    pub fn table_columns<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ColumnDescriptor> + 'a {
        self.columns.values().filter(move |c| c.table == table)
    }
}

/// Captures snapshots of the configured schema
#[derive(Clone)]
pub struct SchemaSnapshotStore {
    db: Arc<dyn Database>,
    schema: String,
}

impl SchemaSnapshotStore {
    pub fn new(db: Arc<dyn Database>, schema: impl Into<String>) -> Self {
        Self {
            db,
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Snapshot of the configured schema
    pub async fn capture(&self) -> Result<SchemaSnapshot, AppError> {
        self.capture_schema(&self.schema).await
    }

    /// Snapshot of an arbitrary schema. One metadata query per call.
    pub async fn capture_schema(&self, schema: &str) -> Result<SchemaSnapshot, AppError> {
        let rows = self.db.column_metadata(schema).await?;
        let snapshot = SchemaSnapshot::from_columns(schema, rows);

        info!(
            "📸 Captured snapshot of '{}': {} tables, {} columns",
            schema,
            snapshot.tables.len(),
            snapshot.columns.len()
        );

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::FakeDatabase;

    #[test]
    fn test_fold_rows_into_snapshot() {
        let snapshot = SchemaSnapshot::from_columns(
            "public",
            vec![
                ColumnDescriptor::new("users", "id", "integer", false, ""),
                ColumnDescriptor::new("users", "email", "character varying(255)", true, ""),
                ColumnDescriptor::new("orders", "id", "integer", false, "nextval('orders_id_seq'::regclass)"),
            ],
        );

        assert_eq!(snapshot.tables.len(), 2);
        assert!(snapshot.has_table("users"));
        assert!(snapshot.has_table("orders"));
        assert_eq!(snapshot.columns.len(), 3);
        assert_eq!(snapshot.columns["users.email"].data_type, "character varying(255)");
        assert_eq!(snapshot.table_columns("users").count(), 2);
    }

    #[test]
    fn test_checksum_consistency() {
        let rows = || {
            vec![
                ColumnDescriptor::new("users", "id", "integer", false, ""),
                ColumnDescriptor::new("users", "name", "text", true, ""),
            ]
        };
        let mut reversed = rows();
        reversed.reverse();

        let a = SchemaSnapshot::from_columns("public", rows());
        let b = SchemaSnapshot::from_columns("public", reversed);
        assert_eq!(a.checksum, b.checksum);

        let c = SchemaSnapshot::from_columns(
            "public",
            vec![
                ColumnDescriptor::new("users", "id", "bigint", false, ""),
                ColumnDescriptor::new("users", "name", "text", true, ""),
            ],
        );
        assert_ne!(a.checksum, c.checksum);
    }

    #[test]
    fn test_same_definition_ignores_identity() {
        let a = ColumnDescriptor::new("users", "id", "integer", false, "");
        let b = ColumnDescriptor::new("accounts", "id", "integer", false, "");
        assert!(a.same_definition(&b));
        assert_ne!(a.key(), b.key());
        assert_eq!(a.describe_definition(), "integer NOT NULL");
    }

    #[tokio::test]
    async fn test_capture_uses_metadata_collaborator() {
        let db = Arc::new(
            FakeDatabase::new()
                .with_table("t", &[("id", "integer")])
                .with_table("u", &[("id", "integer"), ("name", "text")]),
        );
        let store = SchemaSnapshotStore::new(db, "public");

        let snapshot = store.capture().await.unwrap();
        assert_eq!(snapshot.schema, "public");
        assert_eq!(snapshot.tables.len(), 2);
        assert!(snapshot.columns.contains_key("u.name"));
    }

    #[tokio::test]
    async fn test_capture_surfaces_metadata_failure() {
        let db = FakeDatabase::new();
        *db.metadata_fails.lock().unwrap() = true;
        let store = SchemaSnapshotStore::new(Arc::new(db), "public");

        let err = store.capture().await.unwrap_err();
        assert!(err.detail().contains("timed out"));
    }
}
