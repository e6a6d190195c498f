//! Schema comparison preview
//!
//! Predicts what each statement of a script would do against the current
//! schema without executing anything.

use super::script::split_statements;
use crate::snapshot::SchemaSnapshot;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?([\w.]+)").unwrap()
});
static ALTER_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ALTER\s+TABLE\s+(?:IF\s+EXISTS\s+)?(?:ONLY\s+)?([\w.]+)").unwrap()
});
static ADD_COLUMN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bADD\s+COLUMN\s+(?:IF\s+NOT\s+EXISTS\s+)?(\w+)").unwrap());
static INSERT_INTO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^INSERT\s+INTO\s+([\w.]+)").unwrap());
static DROP_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^DROP\s+TABLE\s+(?:IF\s+EXISTS\s+)?([\w.]+)").unwrap());
static SELECT_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:WITH\b.*?\)\s*)?SELECT\s.*?\bFROM\s+([\w.]+)").unwrap());
static UPDATE_SET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^UPDATE\s+(?:ONLY\s+)?([\w.]+)\s.*\bSET\b").unwrap());
static DELETE_FROM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^DELETE\s+FROM\s+(?:ONLY\s+)?([\w.]+)").unwrap());
static WHERE_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bWHERE\b").unwrap());

pub struct SchemaComparison;

impl SchemaComparison {
    /// One or more preview lines per statement, in script order
    pub fn compare(snapshot: &SchemaSnapshot, script: &str) -> Vec<String> {
        let tables: HashSet<String> = snapshot.tables.iter().map(|t| t.to_uppercase()).collect();
        let mut results = Vec::new();

        for statement in split_statements(script) {
            let stmt = WHITESPACE
                .replace_all(&statement.to_uppercase(), " ")
                .trim()
                .to_string();
            let exists = |name: &str| tables.contains(Self::unqualified(name));

            if let Some(table) = Self::capture(&CREATE_TABLE, &stmt) {
                if exists(&table) {
                    results.push(format!("⚠️ Table `{}` already exists.", table));
                } else {
                    results.push(format!("✅ Table `{}` will be created.", table));
                }
            } else if let Some(table) = Self::capture(&ALTER_TABLE, &stmt) {
                if exists(&table) {
                    results.push(format!("✅ Table `{}` exists: checking columns...", table));
                    results.extend(Self::column_differences(snapshot, &table, &stmt));
                } else {
                    results.push(format!("⚠️ ALTER TABLE failed: table `{}` not found.", table));
                }
            } else if let Some(table) = Self::capture(&INSERT_INTO, &stmt) {
                if exists(&table) {
                    results.push(format!(
                        "✅ Data will be inserted into existing table `{}`.",
                        table
                    ));
                } else {
                    results.push(format!("⚠️ INSERT failed: table `{}` not found.", table));
                }
            } else if let Some(table) = Self::capture(&DROP_TABLE, &stmt) {
                if exists(&table) {
                    results.push(format!("🟥 Table `{}` exists: this will drop it.", table));
                } else {
                    results.push(format!(
                        "ℹ️ Table `{}` does not exist: DROP ignored.",
                        table
                    ));
                }
            } else if let Some(table) = Self::capture(&SELECT_FROM, &stmt) {
                if exists(&table) {
                    results.push(format!("ℹ️ SELECT will read data from table `{}`.", table));
                } else {
                    results.push(format!(
                        "⚠️ SELECT references table `{}` that doesn't exist.",
                        table
                    ));
                }
            } else if let Some(table) = Self::capture(&UPDATE_SET, &stmt) {
                if !exists(&table) {
                    results.push(format!("⚠️ UPDATE failed: table `{}` not found.", table));
                } else if WHERE_CLAUSE.is_match(&stmt) {
                    results.push(format!(
                        "🟡 UPDATE will modify matching records in `{}`.",
                        table
                    ));
                } else {
                    results.push(format!(
                        "⚠️ UPDATE in `{}` has no WHERE: all rows would be affected.",
                        table
                    ));
                }
            } else if let Some(table) = Self::capture(&DELETE_FROM, &stmt) {
                if !exists(&table) {
                    results.push(format!("⚠️ DELETE failed: table `{}` not found.", table));
                } else if WHERE_CLAUSE.is_match(&stmt) {
                    results.push(format!(
                        "🟠 DELETE will remove matching rows from `{}`.",
                        table
                    ));
                } else {
                    results.push(format!(
                        "⚠️ DELETE without WHERE: all rows in `{}` will be deleted.",
                        table
                    ));
                }
            } else {
                results.push(format!(
                    "ℹ️ No schema-level operation detected in: {}",
                    Self::summarize(&stmt)
                ));
            }
        }

        results
    }

    fn capture(re: &Regex, stmt: &str) -> Option<String> {
        re.captures(stmt).map(|caps| caps[1].to_string())
    }

    /// `schema.table` -> `table`
    fn unqualified(name: &str) -> &str {
        name.rsplit('.').next().unwrap_or(name)
    }

    fn column_differences(snapshot: &SchemaSnapshot, table: &str, stmt: &str) -> Vec<String> {
        let table_lower = Self::unqualified(table).to_lowercase();
        let existing: HashSet<String> = snapshot
            .table_columns(&table_lower)
            .map(|c| c.column.to_uppercase())
            .collect();

        ADD_COLUMN
            .captures_iter(stmt)
            .map(|caps| {
                let column = &caps[1];
                if existing.contains(column) {
                    format!("⚠️ Column `{}` already exists in `{}`.", column, table)
                } else {
                    format!("✅ Column `{}` will be added to `{}`.", column, table)
                }
            })
            .collect()
    }

    fn summarize(stmt: &str) -> String {
        if stmt.chars().count() > 80 {
            let head: String = stmt.chars().take(77).collect();
            format!("{}...", head)
        } else {
            stmt.to_string()
        }
    }
}
