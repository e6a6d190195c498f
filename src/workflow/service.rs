//! Deployment workflow state machine
//!
//! One instance per session. Each public operation is a total function of
//! (state, action): illegal combinations leave the state alone and come back
//! as a failed [`StageOutcome`], never as an `Err`. Every call appends one
//! line to the transition log and one entry to the audit trail.

use super::report::DeploymentReport;
use super::state::{Stage, StageOutcome, WorkflowError, WorkflowState};
use crate::analysis::SqlValidator;
use crate::audit::{AuditEntry, AuditStatus, AuditTrail};
use crate::backup::BackupProvider;
use crate::impact::RowImpactExecutor;
use crate::snapshot::SchemaSnapshotStore;
use chrono::Local;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Audit source for every workflow entry
pub const AUDIT_SOURCE: &str = "Workflow";

/// Everything the workflow delegates to
#[derive(Clone)]
pub struct Collaborators {
    pub validator: Arc<dyn SqlValidator>,
    pub backup: Arc<dyn BackupProvider>,
    pub audit: Arc<dyn AuditTrail>,
    pub snapshots: SchemaSnapshotStore,
    pub executor: RowImpactExecutor,
}

/// Successful step: operator message, audit status and audit details
struct Progress {
    message: String,
    status: AuditStatus,
    details: String,
}

impl Progress {
    fn new(message: impl Into<String>, status: AuditStatus, details: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
            details: details.into(),
        }
    }
}

pub struct DeploymentWorkflow {
    deps: Collaborators,
    script: Option<String>,
    state: WorkflowState,
    transitions: Vec<String>,
    report: Option<DeploymentReport>,
}

impl DeploymentWorkflow {
    pub fn new(deps: Collaborators) -> Self {
        Self {
            deps,
            script: None,
            state: WorkflowState::Draft,
            transitions: Vec::new(),
            report: None,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn transitions(&self) -> &[String] {
        &self.transitions
    }

    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    pub fn report(&self) -> Option<&DeploymentReport> {
        self.report.as_ref()
    }

    /// Replace the pending script and start over from DRAFT
    pub async fn set_script(&mut self, script: impl Into<String>) -> StageOutcome {
        self.script = Some(script.into());
        self.state = WorkflowState::Draft;
        self.transitions.clear();
        self.report = None;

        let progress = Progress::new(
            "Workflow initialized with SQL script",
            AuditStatus::Draft,
            "Workflow started",
        );
        self.finish(Stage::Initialize, Ok(progress)).await
    }

    pub async fn validate(&mut self) -> StageOutcome {
        let result = self.run_validate().await;
        self.finish(Stage::Validate, result).await
    }

    pub async fn backup(&mut self) -> StageOutcome {
        let result = self.run_backup().await;
        self.finish(Stage::Backup, result).await
    }

    /// First call from BACKUP_CREATED requests approval, second call approves
    pub async fn approve(&mut self) -> StageOutcome {
        let (stage, result) = match self.state {
            WorkflowState::BackupCreated => {
                self.state = WorkflowState::ApprovalPending;
                (
                    Stage::RequestApproval,
                    Ok(Progress::new(
                        "Approval requested. Ready for final approval.",
                        AuditStatus::Pending,
                        "Approval requested",
                    )),
                )
            }
            WorkflowState::ApprovalPending => {
                self.state = WorkflowState::Approved;
                (
                    Stage::Approve,
                    Ok(Progress::new(
                        "Deployment approved. Ready to execute.",
                        AuditStatus::Approved,
                        "Deployment approved",
                    )),
                )
            }
            other => (
                Stage::Approve,
                Err(WorkflowError::Precondition(format!(
                    "Cannot approve at current workflow stage ({}).",
                    other
                ))),
            ),
        };
        self.finish(stage, result).await
    }

    pub async fn deploy(&mut self) -> StageOutcome {
        let result = self.run_deploy().await;
        self.finish(Stage::Deploy, result).await
    }

    /// Back to DRAFT from anywhere; the pending script is kept
    pub async fn reset(&mut self) -> StageOutcome {
        self.state = WorkflowState::Draft;
        self.transitions.clear();
        self.report = None;

        let progress = Progress::new("Workflow reset", AuditStatus::Draft, "Workflow has been reset");
        self.finish(Stage::Reset, Ok(progress)).await
    }

    fn pending_script(&self) -> Option<String> {
        self.script
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    }

    async fn run_validate(&mut self) -> Result<Progress, WorkflowError> {
        if self.state != WorkflowState::Draft {
            return Err(WorkflowError::Precondition(format!(
                "SQL has already been validated (current state: {}). Reset the workflow to validate again.",
                self.state
            )));
        }

        let script = match self.pending_script() {
            Some(script) => script,
            None => {
                self.state = WorkflowState::Draft;
                return Err(WorkflowError::Input("No SQL found to validate.".to_string()));
            }
        };

        if let Err(e) = self.deps.validator.validate(&script).await {
            self.state = WorkflowState::Draft;
            return Err(WorkflowError::Validation(e.detail()));
        }

        self.state = WorkflowState::Validated;
        Ok(Progress::new(
            "SQL validation passed successfully!",
            AuditStatus::Success,
            "SQL validation passed",
        ))
    }

    async fn run_backup(&mut self) -> Result<Progress, WorkflowError> {
        if self.state != WorkflowState::Validated {
            return Err(WorkflowError::Precondition(
                "Please validate SQL first before backup.".to_string(),
            ));
        }

        let location = self
            .deps
            .backup
            .create_backup()
            .await
            .map_err(|e| WorkflowError::Collaborator(format!("Backup failed: {}", e.detail())))?;

        self.state = WorkflowState::BackupCreated;
        Ok(Progress::new(
            format!("Full database backup created at: {}", location),
            AuditStatus::Success,
            format!("Backup created at {}", location),
        ))
    }

    async fn run_deploy(&mut self) -> Result<Progress, WorkflowError> {
        if self.state != WorkflowState::Approved {
            return Err(WorkflowError::Precondition(
                "Deployment must be approved first.".to_string(),
            ));
        }

        let script = self.pending_script().ok_or_else(|| {
            WorkflowError::Input("No SQL script available to deploy.".to_string())
        })?;

        let before = self.deps.snapshots.capture().await.map_err(|e| {
            WorkflowError::Collaborator(format!(
                "Deployment failed: could not capture the pre-deployment snapshot: {}",
                e.detail()
            ))
        })?;

        let row_impact = self.deps.executor.execute(&script).await.map_err(|failure| {
            if failure.is_partial() {
                WorkflowError::PartialExecution {
                    applied: failure.applied,
                    statement: failure.statement,
                    cause: failure.cause,
                }
            } else {
                WorkflowError::Collaborator(format!("Deployment failed: {}", failure.cause))
            }
        })?;

        // Script is committed from here on; a snapshot failure must say so
        let after = self.deps.snapshots.capture().await.map_err(|e| {
            WorkflowError::Collaborator(format!(
                "Script fully applied ({}) but the post-deployment snapshot failed: {}. \
                 Inspect the schema before retrying.",
                row_impact.summary_line(),
                e.detail()
            ))
        })?;

        let report = DeploymentReport::build(&before, &after, row_impact);
        let progress = Progress::new(
            format!(
                "Deployment executed successfully. {}; {} schema change(s).",
                report.row_impact.summary_line(),
                report.diff_summary.total_changes
            ),
            AuditStatus::Success,
            format!(
                "Deployment executed with impact captured: {}",
                report.row_impact.summary_line()
            ),
        );

        self.report = Some(report);
        self.state = WorkflowState::Completed;
        Ok(progress)
    }

    /// Log, audit and fold a stage result into an outcome
    async fn finish(&mut self, stage: Stage, result: Result<Progress, WorkflowError>) -> StageOutcome {
        let (success, status, message, details, failure) = match result {
            Ok(progress) => {
                info!("✅ {}: {}", stage.action(), progress.message);
                (true, progress.status, progress.message, progress.details, None)
            }
            Err(err) => {
                let message = err.to_string();
                warn!("❌ {} failed ({:?}): {}", stage.action(), err.kind(), message);
                (false, AuditStatus::Failed, message.clone(), message, Some(err.kind()))
            }
        };

        self.log(&message);

        let entry = AuditEntry::new(stage.action(), AUDIT_SOURCE, status, details);
        if let Err(e) = self.deps.audit.append(entry).await {
            warn!("Audit append failed for '{}': {}", stage.action(), e);
        }

        debug!("Workflow state is now {}", self.state);

        StageOutcome {
            action: stage.action().to_string(),
            success,
            status,
            state: self.state,
            message,
            failure,
        }
    }

    fn log(&mut self, message: &str) {
        let timestamp = Local::now().format("%H:%M:%S");
        self.transitions.push(format!("{} — {}", timestamp, message));
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: WorkflowState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SyntaxValidator;
    use crate::audit::MemoryAuditTrail;
    use crate::db::fake::FakeDatabase;
    use crate::error::AppError;
    use crate::snapshot::SchemaDiffEntry;
    use crate::workflow::FailureKind;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use regex::Regex;

    struct StubBackup {
        fail_with: Option<String>,
    }

    #[async_trait]
    impl BackupProvider for StubBackup {
        async fn create_backup(&self) -> Result<String, AppError> {
            match &self.fail_with {
                Some(msg) => Err(AppError::Backup(msg.clone())),
                None => Ok("/backups/inventory_2024-01-01_00-00-00.sql".to_string()),
            }
        }
    }

    struct BrokenAudit;

    #[async_trait]
    impl AuditTrail for BrokenAudit {
        async fn append(&self, _entry: AuditEntry) -> Result<(), AppError> {
            Err(AppError::Internal("history table unavailable".to_string()))
        }

        async fn list(&self, _limit: usize) -> Result<Vec<AuditEntry>, AppError> {
            Ok(Vec::new())
        }

        async fn clear(&self) -> Result<u64, AppError> {
            Ok(0)
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum Action {
        Validate,
        Backup,
        Approve,
        Deploy,
    }

    const ACTIONS: [Action; 4] = [Action::Validate, Action::Backup, Action::Approve, Action::Deploy];

    fn designated(state: WorkflowState, action: Action) -> bool {
        matches!(
            (state, action),
            (WorkflowState::Draft, Action::Validate)
                | (WorkflowState::Validated, Action::Backup)
                | (WorkflowState::BackupCreated, Action::Approve)
                | (WorkflowState::ApprovalPending, Action::Approve)
                | (WorkflowState::Approved, Action::Deploy)
        )
    }

    async fn run(workflow: &mut DeploymentWorkflow, action: Action) -> StageOutcome {
        match action {
            Action::Validate => workflow.validate().await,
            Action::Backup => workflow.backup().await,
            Action::Approve => workflow.approve().await,
            Action::Deploy => workflow.deploy().await,
        }
    }

    fn sample_db() -> Arc<FakeDatabase> {
        Arc::new(
            FakeDatabase::new()
                .with_table("t", &[("id", "integer"), ("x", "integer")])
                .with_row_count("UPDATE", 4),
        )
    }

    fn build(
        db: Arc<FakeDatabase>,
        backup: StubBackup,
        audit: Arc<dyn AuditTrail>,
    ) -> DeploymentWorkflow {
        DeploymentWorkflow::new(Collaborators {
            validator: Arc::new(SyntaxValidator::new(db.clone())),
            backup: Arc::new(backup),
            audit,
            snapshots: SchemaSnapshotStore::new(db.clone(), "public"),
            executor: RowImpactExecutor::new(db),
        })
    }

    fn workflow_with_audit(db: Arc<FakeDatabase>) -> (DeploymentWorkflow, Arc<MemoryAuditTrail>) {
        let audit = Arc::new(MemoryAuditTrail::new());
        let workflow = build(db, StubBackup { fail_with: None }, audit.clone());
        (workflow, audit)
    }

    async fn approved(script: &str, db: Arc<FakeDatabase>) -> DeploymentWorkflow {
        let (mut workflow, _) = workflow_with_audit(db);
        workflow.set_script(script).await;
        assert!(workflow.validate().await.success);
        assert!(workflow.backup().await.success);
        assert!(workflow.approve().await.success);
        assert!(workflow.approve().await.success);
        assert_eq!(workflow.state(), WorkflowState::Approved);
        workflow
    }

    #[tokio::test]
    async fn test_illegal_transitions_leave_state_unchanged() {
        for state in WorkflowState::ALL {
            for action in ACTIONS {
                if designated(state, action) {
                    continue;
                }
                let (mut workflow, _) = workflow_with_audit(sample_db());
                workflow.set_script("UPDATE t SET x = 1").await;
                workflow.force_state(state);

                let outcome = run(&mut workflow, action).await;
                assert!(!outcome.success, "{:?} from {} should fail", action, state);
                assert_eq!(outcome.failure, Some(FailureKind::Precondition));
                assert_eq!(outcome.status, AuditStatus::Failed);
                assert_eq!(workflow.state(), state, "{:?} changed state {}", action, state);
            }
        }
    }

    #[tokio::test]
    async fn test_reset_from_any_state() {
        for state in WorkflowState::ALL {
            let (mut workflow, audit) = workflow_with_audit(sample_db());
            workflow.set_script("UPDATE t SET x = 1").await;
            workflow.force_state(state);

            let outcome = workflow.reset().await;
            assert!(outcome.success);
            assert_eq!(outcome.status, AuditStatus::Draft);
            assert_eq!(workflow.state(), WorkflowState::Draft);
            assert_eq!(workflow.transitions().len(), 1);
            assert_eq!(workflow.script(), Some("UPDATE t SET x = 1"));

            let latest = audit.list(1).await.unwrap();
            assert_eq!(latest[0].action, "Reset");
        }
    }

    #[tokio::test]
    async fn test_approve_is_a_two_step_handshake() {
        let (mut workflow, audit) = workflow_with_audit(sample_db());
        workflow.set_script("UPDATE t SET x = 1").await;
        workflow.validate().await;
        workflow.backup().await;

        let requested = workflow.approve().await;
        assert_eq!(requested.action, "Request Approval");
        assert_eq!(requested.status, AuditStatus::Pending);
        assert_eq!(workflow.state(), WorkflowState::ApprovalPending);

        let approved = workflow.approve().await;
        assert_eq!(approved.action, "Approve Deployment");
        assert_eq!(approved.status, AuditStatus::Approved);
        assert_eq!(workflow.state(), WorkflowState::Approved);

        let third = workflow.approve().await;
        assert!(!third.success);
        assert_eq!(workflow.state(), WorkflowState::Approved);

        let statuses: Vec<AuditStatus> = audit
            .list(3)
            .await
            .unwrap()
            .iter()
            .map(|e| e.status)
            .collect();
        assert_eq!(
            statuses,
            vec![AuditStatus::Failed, AuditStatus::Approved, AuditStatus::Pending]
        );
    }

    #[tokio::test]
    async fn test_set_script_resets_everything() {
        let db = sample_db();
        let mut workflow = approved("UPDATE t SET x = 1", db).await;
        assert!(workflow.deploy().await.success);
        assert!(workflow.report().is_some());

        let outcome = workflow.set_script("DELETE FROM t WHERE id = 1").await;
        assert!(outcome.success);
        assert_eq!(outcome.action, "Workflow Initialized");
        assert_eq!(workflow.state(), WorkflowState::Draft);
        assert!(workflow.report().is_none());
        assert_eq!(workflow.transitions().len(), 1);
        assert!(workflow.transitions()[0].ends_with("Workflow initialized with SQL script"));
    }

    #[tokio::test]
    async fn test_set_script_resets_from_any_state() {
        for state in WorkflowState::ALL {
            let (mut workflow, _audit) = workflow_with_audit(sample_db());
            workflow.set_script("UPDATE t SET x = 1").await;
            workflow.force_state(state);

            let outcome = workflow.set_script("DELETE FROM t WHERE id = 1").await;
            assert!(outcome.success, "set_script failed from {:?}", state);
            assert_eq!(workflow.state(), WorkflowState::Draft);
            assert!(workflow.report().is_none());
            assert_eq!(workflow.transitions().len(), 1);
            assert_eq!(workflow.script(), Some("DELETE FROM t WHERE id = 1"));
        }
    }

    #[tokio::test]
    async fn test_end_to_end_update_deployment() {
        let db = sample_db();
        let (mut workflow, audit) = workflow_with_audit(db.clone());

        workflow.set_script("UPDATE t SET x=1").await;

        let validated = workflow.validate().await;
        assert!(validated.success);
        assert_eq!(workflow.state(), WorkflowState::Validated);

        let backup = workflow.backup().await;
        assert!(backup.success);
        assert!(backup.message.contains("/backups/inventory_2024-01-01_00-00-00.sql"));
        assert_eq!(workflow.state(), WorkflowState::BackupCreated);

        workflow.approve().await;
        workflow.approve().await;
        assert_eq!(workflow.state(), WorkflowState::Approved);

        let deployed = workflow.deploy().await;
        assert!(deployed.success, "{}", deployed.message);
        assert_eq!(workflow.state(), WorkflowState::Completed);

        let report = workflow.report().unwrap();
        assert_eq!(report.row_impact.update_count, 4);
        assert_eq!(report.row_impact.executed_statements, vec!["UPDATE t SET x=1"]);
        assert_eq!(
            report.schema_diff,
            vec![SchemaDiffEntry::NoChanges {
                schema: "public".to_string()
            }]
        );
        assert!(!report.schema_changed());

        // One log line and one audit entry per call
        assert_eq!(workflow.transitions().len(), 6);
        let line = Regex::new(r"^\d{2}:\d{2}:\d{2} — ").unwrap();
        assert!(workflow.transitions().iter().all(|l| line.is_match(l)));

        let entries = audit.list(100).await.unwrap();
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[0].action, "Deploy to Database");
        assert_eq!(entries[0].status, AuditStatus::Success);
        assert!(entries.iter().all(|e| e.source == "Workflow"));
        assert!(db.executed().contains(&"UPDATE t SET x=1".to_string()));
    }

    #[tokio::test]
    async fn test_deploy_reports_schema_changes() {
        let db = sample_db();
        let mut workflow = approved("CREATE TABLE u (id INT NOT NULL); ALTER TABLE t ADD COLUMN note TEXT", db).await;

        let outcome = workflow.deploy().await;
        assert!(outcome.success, "{}", outcome.message);

        let report = workflow.report().unwrap();
        assert_eq!(report.schema_diff[0], SchemaDiffEntry::TableAdded("u".to_string()));
        assert_eq!(report.diff_summary.columns_added, 2);
        assert!(report.schema_changed());
        assert!(report
            .schema_impact()
            .contains(&"+ Column added: t.note text NULLABLE=YES".to_string()));
    }

    #[tokio::test]
    async fn test_partial_failure_stays_approved() {
        let db = sample_db();
        let mut workflow =
            approved("INSERT INTO t VALUES (1, 1); INSERT INTO missing VALUES (2)", db.clone()).await;

        let outcome = workflow.deploy().await;
        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(FailureKind::PartialExecution));
        assert_eq!(workflow.state(), WorkflowState::Approved);
        assert!(workflow.report().is_none());
        assert!(outcome.message.contains("remain committed"));
        assert!(outcome.message.contains("INSERT: 1, UPDATE: 0, DELETE: 0"));
        assert_eq!(db.executed(), vec!["INSERT INTO t VALUES (1, 1)".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_before_any_commit_is_collaborator_failure() {
        let db = sample_db();
        let mut workflow = approved("INSERT INTO missing VALUES (2)", db).await;

        let outcome = workflow.deploy().await;
        assert_eq!(outcome.failure, Some(FailureKind::Collaborator));
        assert_eq!(
            outcome.message,
            "Deployment failed: relation \"missing\" does not exist"
        );
        assert_eq!(workflow.state(), WorkflowState::Approved);
    }

    #[tokio::test]
    async fn test_backup_failure_keeps_validated() {
        let audit = Arc::new(MemoryAuditTrail::new());
        let mut workflow = build(
            sample_db(),
            StubBackup {
                fail_with: Some("pg_dump: connection refused".to_string()),
            },
            audit.clone(),
        );
        workflow.set_script("UPDATE t SET x = 1").await;
        workflow.validate().await;

        let outcome = workflow.backup().await;
        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(FailureKind::Collaborator));
        assert_eq!(outcome.message, "Backup failed: pg_dump: connection refused");
        assert_eq!(workflow.state(), WorkflowState::Validated);

        let latest = audit.list(1).await.unwrap();
        assert_eq!(latest[0].action, "Backup Database");
        assert_eq!(latest[0].details, "Backup failed: pg_dump: connection refused");
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let (mut workflow, _) = workflow_with_audit(sample_db());

        workflow.set_script("   ").await;
        let blank = workflow.validate().await;
        assert_eq!(blank.failure, Some(FailureKind::Input));
        assert_eq!(blank.message, "No SQL found to validate.");
        assert_eq!(workflow.state(), WorkflowState::Draft);

        workflow.set_script("GRANT ALL ON t TO bob").await;
        let rejected = workflow.validate().await;
        assert_eq!(rejected.failure, Some(FailureKind::Validation));
        assert!(rejected.message.starts_with("SQL must start with a valid SQL keyword"));
        assert_eq!(workflow.state(), WorkflowState::Draft);
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_change_outcome() {
        let mut workflow = build(sample_db(), StubBackup { fail_with: None }, Arc::new(BrokenAudit));
        workflow.set_script("UPDATE t SET x = 1").await;

        let outcome = workflow.validate().await;
        assert!(outcome.success);
        assert_eq!(workflow.state(), WorkflowState::Validated);
        assert_eq!(workflow.transitions().len(), 2);
    }

    #[tokio::test]
    async fn test_deploy_without_script() {
        let (mut workflow, _) = workflow_with_audit(sample_db());
        workflow.force_state(WorkflowState::Approved);

        let outcome = workflow.deploy().await;
        assert_eq!(outcome.failure, Some(FailureKind::Input));
        assert_eq!(outcome.message, "No SQL script available to deploy.");
        assert_eq!(workflow.state(), WorkflowState::Approved);
    }
}
