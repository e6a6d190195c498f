//! SQL query constants and builders
//!
//! Contains all SQL queries used by the application.

/// Connectivity check
pub const PING: &str = "SELECT 1 AS ok";

/// Column metadata for one schema, one row per column.
/// Types are rendered with their length/precision so `varchar(50)` and
/// `varchar(100)` differ in a snapshot diff.
pub const COLUMN_METADATA: &str = r#"
    SELECT
        c.table_name::text AS table_name,
        c.column_name::text AS column_name,
        pg_catalog.format_type(a.atttypid, a.atttypmod) AS column_type,
        c.is_nullable::text AS is_nullable,
        COALESCE(c.column_default::text, '') AS column_default
    FROM information_schema.columns c
    JOIN pg_catalog.pg_namespace n ON n.nspname = c.table_schema
    JOIN pg_catalog.pg_class cls ON cls.relnamespace = n.oid AND cls.relname = c.table_name
    JOIN pg_catalog.pg_attribute a ON a.attrelid = cls.oid AND a.attname = c.column_name
    WHERE c.table_schema = $1
    ORDER BY c.table_name, c.ordinal_position
"#;

/// Audit trail table
pub const CREATE_HISTORY_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS deployment_history (
        id UUID PRIMARY KEY,
        action VARCHAR(255) NOT NULL,
        source VARCHAR(255) NOT NULL,
        status VARCHAR(32) NOT NULL,
        details VARCHAR(2000),
        recorded_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
"#;

pub const CREATE_HISTORY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_deployment_history_recorded_at ON deployment_history(recorded_at DESC)";

pub const INSERT_HISTORY: &str = r#"
    INSERT INTO deployment_history (id, action, source, status, details, recorded_at)
    VALUES ($1, $2, $3, $4, $5, $6)
"#;

pub const LIST_HISTORY: &str = r#"
    SELECT id, action, source, status, COALESCE(details, '') AS details, recorded_at
    FROM deployment_history
    ORDER BY recorded_at DESC
    LIMIT $1
"#;

pub const CLEAR_HISTORY: &str = "DELETE FROM deployment_history";

/// Wrap an arbitrary query so each row comes back as one JSON text value
pub fn wrap_row_to_json(sql: &str, limit: usize) -> String {
    let inner = sql.trim().trim_end_matches(';').trim_end();
    format!(
        "SELECT row_to_json(preview_q)::text FROM ({}) AS preview_q LIMIT {}",
        inner, limit
    )
}

/// SQL builder for safe identifier quoting
pub struct SqlBuilder;

impl SqlBuilder {
    /// Quote an identifier (table/column name) safely
    pub fn quote_ident(ident: &str) -> String {
        // PostgreSQL identifier quoting
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// schema.table with both parts quoted
    pub fn qualified(schema: &str, table: &str) -> String {
        format!("{}.{}", Self::quote_ident(schema), Self::quote_ident(table))
    }

    pub fn create_schema(schema: &str) -> String {
        format!("CREATE SCHEMA IF NOT EXISTS {}", Self::quote_ident(schema))
    }

    pub fn drop_table_if_exists(schema: &str, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", Self::qualified(schema, table))
    }

    /// Structure copy including defaults, constraints and indexes
    pub fn create_table_like(target_schema: &str, source_schema: &str, table: &str) -> String {
        format!(
            "CREATE TABLE {} (LIKE {} INCLUDING ALL)",
            Self::qualified(target_schema, table),
            Self::qualified(source_schema, table)
        )
    }

    pub fn copy_rows(target_schema: &str, source_schema: &str, table: &str) -> String {
        format!(
            "INSERT INTO {} SELECT * FROM {}",
            Self::qualified(target_schema, table),
            Self::qualified(source_schema, table)
        )
    }
}
