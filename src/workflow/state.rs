//! Workflow states, stages and outcomes

use crate::audit::AuditStatus;
use crate::impact::RowImpactSummary;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a deployment currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Draft,
    Validated,
    BackupCreated,
    ApprovalPending,
    Approved,
    Completed,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 6] = [
        WorkflowState::Draft,
        WorkflowState::Validated,
        WorkflowState::BackupCreated,
        WorkflowState::ApprovalPending,
        WorkflowState::Approved,
        WorkflowState::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Draft => "DRAFT",
            WorkflowState::Validated => "VALIDATED",
            WorkflowState::BackupCreated => "BACKUP_CREATED",
            WorkflowState::ApprovalPending => "APPROVAL_PENDING",
            WorkflowState::Approved => "APPROVED",
            WorkflowState::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named step of the workflow, as recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initialize,
    Validate,
    Backup,
    RequestApproval,
    Approve,
    Deploy,
    Reset,
}

impl Stage {
    pub fn action(&self) -> &'static str {
        match self {
            Stage::Initialize => "Workflow Initialized",
            Stage::Validate => "Validate SQL",
            Stage::Backup => "Backup Database",
            Stage::RequestApproval => "Request Approval",
            Stage::Approve => "Approve Deployment",
            Stage::Deploy => "Deploy to Database",
            Stage::Reset => "Reset",
        }
    }
}

/// Error taxonomy for workflow operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Input,
    Precondition,
    Validation,
    Collaborator,
    PartialExecution,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Nothing to work on
    #[error("{0}")]
    Input(String),

    /// Wrong state for the requested step; nothing changed
    #[error("{0}")]
    Precondition(String),

    /// Validator rejected the script
    #[error("{0}")]
    Validation(String),

    /// Backup, snapshot or execution collaborator failed
    #[error("{0}")]
    Collaborator(String),

    /// Script failed after earlier statements committed
    #[error(
        "Deployment partially applied: statement `{}` failed: {}. \
         {} earlier statement(s) remain committed ({}).",
        .statement,
        .cause,
        .applied.executed_statements.len(),
        .applied.summary_line()
    )]
    PartialExecution {
        applied: RowImpactSummary,
        statement: String,
        cause: String,
    },
}

impl WorkflowError {
    pub fn kind(&self) -> FailureKind {
        match self {
            WorkflowError::Input(_) => FailureKind::Input,
            WorkflowError::Precondition(_) => FailureKind::Precondition,
            WorkflowError::Validation(_) => FailureKind::Validation,
            WorkflowError::Collaborator(_) => FailureKind::Collaborator,
            WorkflowError::PartialExecution { .. } => FailureKind::PartialExecution,
        }
    }
}

/// What one workflow call did, ready for the presentation layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub action: String,
    pub success: bool,
    pub status: AuditStatus,
    /// State after the call
    pub state: WorkflowState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}
