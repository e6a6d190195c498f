//! Schema Diff Engine
//!
//! Compares the snapshot taken before a deployment with the one taken after.
//! This is the "git diff" for your database schema.

use super::store::{ColumnDescriptor, SchemaSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Type of schema change detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
    /// The "nothing changed" sentinel
    Unchanged,
}

/// A single item in the schema diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SchemaDiffEntry {
    TableAdded(String),
    TableRemoved(String),
    ColumnAdded(ColumnDescriptor),
    ColumnRemoved(ColumnDescriptor),
    ColumnModified {
        before: ColumnDescriptor,
        after: ColumnDescriptor,
    },
    /// Emitted alone when the two snapshots are structurally identical
    NoChanges { schema: String },
}

impl SchemaDiffEntry {
    pub fn change_type(&self) -> ChangeType {
        match self {
            SchemaDiffEntry::TableAdded(_) | SchemaDiffEntry::ColumnAdded(_) => ChangeType::Added,
            SchemaDiffEntry::TableRemoved(_) | SchemaDiffEntry::ColumnRemoved(_) => ChangeType::Removed,
            SchemaDiffEntry::ColumnModified { .. } => ChangeType::Modified,
            SchemaDiffEntry::NoChanges { .. } => ChangeType::Unchanged,
        }
    }

    /// `table` or `table.column` the entry is about
    pub fn object_path(&self) -> String {
        match self {
            SchemaDiffEntry::TableAdded(t) | SchemaDiffEntry::TableRemoved(t) => t.clone(),
            SchemaDiffEntry::ColumnAdded(c) | SchemaDiffEntry::ColumnRemoved(c) => c.key(),
            SchemaDiffEntry::ColumnModified { after, .. } => after.key(),
            SchemaDiffEntry::NoChanges { schema } => schema.clone(),
        }
    }

    /// Data loss is possible for removals
    pub fn is_breaking(&self) -> bool {
        self.change_type() == ChangeType::Removed
    }
}

fn describe_column(c: &ColumnDescriptor) -> String {
    let mut out = format!(
        "{}.{} {} NULLABLE={}",
        c.table,
        c.column,
        c.data_type,
        if c.nullable { "YES" } else { "NO" }
    );
    if !c.default_value.is_empty() {
        out.push_str(&format!(" DEFAULT={}", c.default_value));
    }
    out
}

impl fmt::Display for SchemaDiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaDiffEntry::TableAdded(t) => write!(f, "+ Table created: {}", t),
            SchemaDiffEntry::TableRemoved(t) => write!(f, "- Table dropped: {}", t),
            SchemaDiffEntry::ColumnAdded(c) => write!(f, "+ Column added: {}", describe_column(c)),
            SchemaDiffEntry::ColumnRemoved(c) => {
                write!(f, "- Column removed: {}", describe_column(c))
            }
            SchemaDiffEntry::ColumnModified { before, after } => write!(
                f,
                "~ Column modified: {} ({} → {})",
                before.key(),
                before.describe_definition(),
                after.describe_definition()
            ),
            SchemaDiffEntry::NoChanges { schema } => {
                write!(f, "No schema changes detected in schema '{}'.", schema)
            }
        }
    }
}

/// Counts per change kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub tables_added: usize,
    pub tables_removed: usize,
    pub columns_added: usize,
    pub columns_removed: usize,
    pub columns_modified: usize,
    pub total_changes: usize,
}

impl DiffSummary {
    pub fn from_entries(entries: &[SchemaDiffEntry]) -> Self {
        let mut summary = DiffSummary::default();
        for entry in entries {
            match entry {
                SchemaDiffEntry::TableAdded(_) => summary.tables_added += 1,
                SchemaDiffEntry::TableRemoved(_) => summary.tables_removed += 1,
                SchemaDiffEntry::ColumnAdded(_) => summary.columns_added += 1,
                SchemaDiffEntry::ColumnRemoved(_) => summary.columns_removed += 1,
                SchemaDiffEntry::ColumnModified { .. } => summary.columns_modified += 1,
                SchemaDiffEntry::NoChanges { .. } => continue,
            }
            summary.total_changes += 1;
        }
        summary
    }
}

/// The diff engine that compares schema snapshots
pub struct DiffEngine;

impl DiffEngine {
    /// Compare two snapshots.
    ///
    /// Entries come out grouped: every added table, every removed table, then
    /// column entries in key order over the union of both snapshots' columns.
    /// Never empty: identical snapshots yield a single `NoChanges`.
    pub fn diff(before: &SchemaSnapshot, after: &SchemaSnapshot) -> Vec<SchemaDiffEntry> {
        let mut changes = Vec::new();

        for table in after.tables.difference(&before.tables) {
            changes.push(SchemaDiffEntry::TableAdded(table.clone()));
        }
        for table in before.tables.difference(&after.tables) {
            changes.push(SchemaDiffEntry::TableRemoved(table.clone()));
        }

        let keys: BTreeSet<&String> = before.columns.keys().chain(after.columns.keys()).collect();

        for key in keys {
            match (before.columns.get(key), after.columns.get(key)) {
                (None, Some(added)) => changes.push(SchemaDiffEntry::ColumnAdded(added.clone())),
                (Some(removed), None) => {
                    changes.push(SchemaDiffEntry::ColumnRemoved(removed.clone()))
                }
                (Some(b), Some(a)) if !b.same_definition(a) => {
                    changes.push(SchemaDiffEntry::ColumnModified {
                        before: b.clone(),
                        after: a.clone(),
                    })
                }
                _ => {}
            }
        }

        if changes.is_empty() {
            changes.push(SchemaDiffEntry::NoChanges {
                schema: after.schema.clone(),
            });
        }

        changes
    }

    /// Render entries the way the transition log and report show them
    pub fn describe(entries: &[SchemaDiffEntry]) -> Vec<String> {
        entries.iter().map(|e| e.to_string()).collect()
    }
}
