//! Session and deployment workflow route handlers

use crate::analysis::split_statements;
use crate::audit::{AuditEntry, AuditStatus};
use crate::error::{validation_error, ApiResult, AppError};
use crate::models::{
    AnalysisResponse, MessageResponse, SessionCreatedResponse, SetScriptRequest, StageResponse,
    SuccessResponse, WorkflowView,
};
use crate::state::SharedState;
use crate::workflow::{FailureKind, StageOutcome, WorkflowState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// Workflow action named in the request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowAction {
    Validate,
    Backup,
    Approve,
    Deploy,
    Reset,
}

impl FromStr for WorkflowAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validate" => Ok(WorkflowAction::Validate),
            "backup" => Ok(WorkflowAction::Backup),
            "approve" => Ok(WorkflowAction::Approve),
            "deploy" => Ok(WorkflowAction::Deploy),
            "reset" => Ok(WorkflowAction::Reset),
            other => Err(AppError::BadRequest(format!(
                "Unknown workflow action '{}' (expected validate, backup, approve, deploy or reset)",
                other
            ))),
        }
    }
}

/// HTTP status for a workflow outcome
fn status_for(outcome: &StageOutcome) -> StatusCode {
    match outcome.failure {
        None => StatusCode::OK,
        Some(FailureKind::Input) | Some(FailureKind::Validation) => StatusCode::BAD_REQUEST,
        Some(FailureKind::Precondition) => StatusCode::CONFLICT,
        Some(FailureKind::PartialExecution) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(FailureKind::Collaborator) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Open a new session with its own workflow
pub async fn create_session(
    State(state): State<SharedState>,
) -> ApiResult<(StatusCode, Json<SessionCreatedResponse>)> {
    let session_id = state.sessions.create().await;

    Ok((
        StatusCode::CREATED,
        Json(SessionCreatedResponse {
            success: true,
            session_id,
            state: WorkflowState::Draft,
        }),
    ))
}

/// Close a session and drop its workflow
pub async fn close_session(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    state.sessions.remove(session_id).await?;
    Ok(Json(MessageResponse::new(format!("Session {} closed", session_id))))
}

/// Upload or replace the session's pending script
pub async fn set_script(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<SetScriptRequest>,
) -> ApiResult<Json<StageResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let handle = state.sessions.get(session_id).await?;
    let mut workflow = handle.lock().await;

    let statements = split_statements(&payload.script).len();
    let characters = payload.script.chars().count();
    let outcome = workflow.set_script(payload.script).await;

    state
        .record(AuditEntry::new(
            "Upload SQL Script",
            "Development",
            AuditStatus::Success,
            format!("{} statement(s), {} character(s)", statements, characters),
        ))
        .await;

    info!("📄 Session {} received a script with {} statement(s)", session_id, statements);

    Ok(Json(StageResponse {
        outcome,
        workflow: WorkflowView::from_workflow(session_id, &workflow),
    }))
}

/// Current state, transition log and last report of a session
pub async fn get_workflow(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<WorkflowView>>> {
    let handle = state.sessions.get(session_id).await?;
    let workflow = handle.lock().await;
    let view = WorkflowView::from_workflow(session_id, &workflow);

    Ok(Json(SuccessResponse::with_data(
        format!("Workflow is {}", view.state),
        view,
    )))
}

/// Run one workflow action; failures come back as an outcome, not an error
pub async fn run_action(
    State(state): State<SharedState>,
    Path((session_id, action)): Path<(Uuid, String)>,
) -> ApiResult<(StatusCode, Json<StageResponse>)> {
    let action: WorkflowAction = action.parse()?;
    let handle = state.sessions.get(session_id).await?;
    let mut workflow = handle.lock().await;

    let outcome = match action {
        WorkflowAction::Validate => workflow.validate().await,
        WorkflowAction::Backup => workflow.backup().await,
        WorkflowAction::Approve => workflow.approve().await,
        WorkflowAction::Deploy => workflow.deploy().await,
        WorkflowAction::Reset => workflow.reset().await,
    };

    let status = status_for(&outcome);
    Ok((
        status,
        Json(StageResponse {
            outcome,
            workflow: WorkflowView::from_workflow(session_id, &workflow),
        }),
    ))
}

/// Risk findings for the session's pending script
pub async fn analyze_session_script(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<AnalysisResponse>> {
    let handle = state.sessions.get(session_id).await?;
    let script = handle
        .lock()
        .await
        .script()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("No SQL script uploaded for this session.".to_string()))?;

    let response = super::analysis::analyze_script(&script, true);
    state
        .record(AuditEntry::new(
            "Analyze SQL",
            "SQL Analysis",
            AuditStatus::View,
            format!("{} finding(s) for session {}", response.findings.len(), session_id),
        ))
        .await;

    Ok(Json(response))
}
