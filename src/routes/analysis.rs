//! Analysis, comparison and preview route handlers
//!
//! None of these change the target database.

use crate::analysis::findings::max_severity;
use crate::analysis::{split_statements, SchemaComparison, SqlAnalyzer, StatementKind};
use crate::audit::{AuditEntry, AuditStatus};
use crate::db::Database;
use crate::error::{validation_error, ApiResult, AppError};
use crate::models::{
    AnalysisResponse, AnalyzeRequest, CompareRequest, CompareResponse, PreviewRequest,
    PreviewResponse,
};
use crate::state::SharedState;
use axum::{extract::State, Json};
use tracing::{debug, info};
use validator::Validate;

/// Whole-script findings, optionally with a per-statement breakdown
pub(super) fn analyze_script(sql: &str, per_statement: bool) -> AnalysisResponse {
    let findings = SqlAnalyzer::smart_analyze(sql);
    let statements = if per_statement {
        SqlAnalyzer::analyze_statements(sql)
    } else {
        Vec::new()
    };

    AnalysisResponse {
        success: true,
        highest_severity: max_severity(&findings),
        findings,
        statements,
    }
}

/// Risk findings for ad-hoc SQL
pub async fn analyze_sql(
    State(state): State<SharedState>,
    Json(payload): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalysisResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let response = analyze_script(&payload.sql, payload.per_statement);
    debug!("Analysis produced {} finding(s)", response.findings.len());

    state
        .record(AuditEntry::new(
            "Analyze SQL",
            "SQL Analysis",
            AuditStatus::View,
            format!("{} finding(s)", response.findings.len()),
        ))
        .await;

    Ok(Json(response))
}

/// Predict what a script would do against the current schema
pub async fn compare_schema(
    State(state): State<SharedState>,
    Json(payload): Json<CompareRequest>,
) -> ApiResult<Json<CompareResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let snapshot = state.snapshots.capture().await?;
    let predictions = SchemaComparison::compare(&snapshot, &payload.sql);
    info!(
        "🔍 Compared script against '{}' ({} table(s)): {} prediction(s)",
        snapshot.schema,
        snapshot.tables.len(),
        predictions.len()
    );

    Ok(Json(CompareResponse {
        success: true,
        schema: snapshot.schema,
        checksum: snapshot.checksum,
        predictions,
    }))
}

/// Run one SELECT and return its first rows
pub async fn preview_select(
    State(state): State<SharedState>,
    Json(payload): Json<PreviewRequest>,
) -> ApiResult<Json<PreviewResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let statement = single_select(&payload.sql)?;
    let preview = fetch_preview(state.db.as_ref(), &statement, state.preview_row_limit).await?;
    Ok(Json(preview))
}

/// First `limit` rows; one extra row is fetched to tell whether more exist
async fn fetch_preview(
    db: &dyn Database,
    statement: &str,
    limit: usize,
) -> Result<PreviewResponse, AppError> {
    let mut rows = db.query_rows(statement, limit.saturating_add(1)).await?;
    let truncated = rows.len() > limit;
    rows.truncate(limit);

    Ok(PreviewResponse {
        success: true,
        row_count: rows.len(),
        rows,
        limit,
        truncated,
    })
}

fn single_select(sql: &str) -> Result<String, AppError> {
    let mut statements = split_statements(sql);
    if statements.len() != 1 {
        return Err(AppError::BadRequest(
            "Preview accepts exactly one SELECT statement.".to_string(),
        ));
    }

    let statement = statements.remove(0);
    match StatementKind::from_leading_keyword(&statement.to_uppercase()) {
        StatementKind::Select => Ok(statement),
        other => Err(AppError::BadRequest(format!(
            "Only SELECT statements can be previewed (got {:?}).",
            other
        ))),
    }
}
