//! Deployment report

use crate::impact::RowImpactSummary;
use crate::snapshot::{DiffEngine, DiffSummary, SchemaDiffEntry, SchemaSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a successful deploy changed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReport {
    pub schema: String,
    pub deployed_at: DateTime<Utc>,
    pub schema_diff: Vec<SchemaDiffEntry>,
    pub diff_summary: DiffSummary,
    pub row_impact: RowImpactSummary,
    pub before_checksum: String,
    pub after_checksum: String,
}

impl DeploymentReport {
    pub fn build(before: &SchemaSnapshot, after: &SchemaSnapshot, row_impact: RowImpactSummary) -> Self {
        let schema_diff = DiffEngine::diff(before, after);
        let diff_summary = DiffSummary::from_entries(&schema_diff);

        Self {
            schema: after.schema.clone(),
            deployed_at: Utc::now(),
            schema_diff,
            diff_summary,
            row_impact,
            before_checksum: before.checksum.clone(),
            after_checksum: after.checksum.clone(),
        }
    }

    /// Diff entries rendered one per line
    pub fn schema_impact(&self) -> Vec<String> {
        DiffEngine::describe(&self.schema_diff)
    }

    pub fn schema_changed(&self) -> bool {
        self.before_checksum != self.after_checksum
    }
}
