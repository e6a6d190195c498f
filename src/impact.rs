//! Row impact accounting
//!
//! Executes a script statement by statement and tallies the rows each
//! INSERT, UPDATE and DELETE touched. Statements commit independently, so a
//! failure partway leaves earlier statements applied.

use crate::analysis::script::split_statements;
use crate::analysis::StatementKind;
use crate::db::Database;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowImpactSummary {
    pub insert_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
    /// Successfully executed statements, in script order
    pub executed_statements: Vec<String>,
}

impl RowImpactSummary {
    /// `INSERT: n, UPDATE: n, DELETE: n`
    pub fn summary_line(&self) -> String {
        format!(
            "INSERT: {}, UPDATE: {}, DELETE: {}",
            self.insert_count, self.update_count, self.delete_count
        )
    }

    pub fn total_rows(&self) -> u64 {
        self.insert_count + self.update_count + self.delete_count
    }

    fn record(&mut self, kind: StatementKind, rows: u64) {
        match kind {
            StatementKind::Insert => self.insert_count += rows,
            StatementKind::Update => self.update_count += rows,
            StatementKind::Delete => self.delete_count += rows,
            _ => {}
        }
    }
}

/// A statement failed; `applied` holds what ran before it
#[derive(Debug, Error)]
#[error("{cause}")]
pub struct ExecutionFailure {
    pub applied: RowImpactSummary,
    pub statement: String,
    pub cause: String,
}

impl ExecutionFailure {
    /// At least one earlier statement committed
    pub fn is_partial(&self) -> bool {
        !self.applied.executed_statements.is_empty()
    }
}

#[derive(Clone)]
pub struct RowImpactExecutor {
    db: Arc<dyn Database>,
}

impl RowImpactExecutor {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Run every statement of `script` in order, stopping at the first failure
    pub async fn execute(&self, script: &str) -> Result<RowImpactSummary, ExecutionFailure> {
        let mut summary = RowImpactSummary::default();

        for statement in split_statements(script) {
            let kind = StatementKind::from_leading_keyword(&statement.to_uppercase());

            let result = if kind.is_dml() {
                self.db.execute_counted(&statement).await
            } else {
                self.db.execute(&statement).await.map(|_| 0)
            };

            match result {
                Ok(rows) => {
                    debug!("Executed {:?} statement, {} row(s): {}", kind, rows, statement);
                    summary.record(kind, rows);
                    summary.executed_statements.push(statement);
                }
                Err(e) => {
                    return Err(ExecutionFailure {
                        applied: summary,
                        statement,
                        cause: e.detail(),
                    });
                }
            }
        }

        info!(
            "Executed {} statement(s) ({})",
            summary.executed_statements.len(),
            summary.summary_line()
        );
        Ok(summary)
    }
}
