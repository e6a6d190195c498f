//! Analysis, comparison and preview DTOs

use crate::analysis::{Finding, Severity, StatementAnalysis};
use crate::db::JsonRow;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[validate(length(min = 1, message = "No SQL provided."))]
    pub sql: String,

    /// Also split the script and analyze each statement
    #[serde(default)]
    pub per_statement: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub success: bool,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highest_severity: Option<Severity>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<StatementAnalysis>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompareRequest {
    #[validate(length(min = 1, message = "No SQL provided."))]
    pub sql: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResponse {
    pub success: bool,
    pub schema: String,
    pub checksum: String,
    pub predictions: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[validate(length(min = 1, message = "No SQL provided."))]
    pub sql: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub success: bool,
    pub rows: Vec<JsonRow>,
    pub row_count: usize,
    pub limit: usize,
    /// The cap was reached; more rows may exist
    pub truncated: bool,
}
