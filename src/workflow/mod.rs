//! Deployment workflow
//!
//! DRAFT → VALIDATED → BACKUP_CREATED → APPROVAL_PENDING → APPROVED → COMPLETED,
//! with reset back to DRAFT from anywhere.

pub mod report;
pub mod service;
pub mod state;

pub use report::DeploymentReport;
pub use service::{Collaborators, DeploymentWorkflow};
pub use state::{FailureKind, Stage, StageOutcome, WorkflowError, WorkflowState};
