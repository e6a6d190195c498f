//! Session and workflow DTOs

use crate::workflow::{DeploymentReport, DeploymentWorkflow, StageOutcome, WorkflowState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn not_blank(script: &str) -> Result<(), ValidationError> {
    if script.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("No SQL found in the uploaded script.".into());
        return Err(err);
    }
    Ok(())
}

/// Upload or replace the pending script of a session
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetScriptRequest {
    #[validate(custom(function = "not_blank"))]
    pub script: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreatedResponse {
    pub success: bool,
    pub session_id: Uuid,
    pub state: WorkflowState,
}

/// Read-only view of one session's workflow
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowView {
    pub session_id: Uuid,
    pub state: WorkflowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    pub transitions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DeploymentReport>,
    /// Diff lines of the last deploy, ready for display
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schema_impact: Vec<String>,
}

impl WorkflowView {
    pub fn from_workflow(session_id: Uuid, workflow: &DeploymentWorkflow) -> Self {
        let report = workflow.report().cloned();
        let schema_impact = report
            .as_ref()
            .map(DeploymentReport::schema_impact)
            .unwrap_or_default();

        Self {
            session_id,
            state: workflow.state(),
            script: workflow.script().map(str::to_string),
            transitions: workflow.transitions().to_vec(),
            report,
            schema_impact,
        }
    }
}

/// Outcome of one workflow action plus the workflow as it now stands
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResponse {
    #[serde(flatten)]
    pub outcome: StageOutcome,
    pub workflow: WorkflowView,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_script_is_rejected() {
        let req = SetScriptRequest {
            script: " \n\t ".to_string(),
        };
        assert!(req.validate().is_err());

        let req = SetScriptRequest {
            script: "SELECT 1".to_string(),
        };
        assert!(req.validate().is_ok());
    }
}
