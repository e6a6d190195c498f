//! Audit history route handlers

use crate::error::{validation_error, ApiResult};
use crate::models::{ClearHistoryResponse, HistoryQuery, HistoryResponse};
use crate::state::SharedState;
use axum::{
    extract::{Query, State},
    Json,
};
use tracing::info;
use validator::Validate;

/// Audit entries, newest first
pub async fn list_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    query.validate().map_err(|e| validation_error(e.to_string()))?;

    let entries = state.audit.list(query.limit()).await?;

    Ok(Json(HistoryResponse {
        success: true,
        count: entries.len(),
        entries,
    }))
}

/// Remove every audit entry
pub async fn clear_history(
    State(state): State<SharedState>,
) -> ApiResult<Json<ClearHistoryResponse>> {
    let removed = state.audit.clear().await?;
    info!("🧹 Cleared {} audit entries", removed);

    Ok(Json(ClearHistoryResponse {
        success: true,
        message: format!("Deleted {} history record(s)", removed),
        removed,
    }))
}
