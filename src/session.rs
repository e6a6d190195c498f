//! Per-session workflows
//!
//! Each session owns its own [`DeploymentWorkflow`] behind a mutex, so two
//! operators never share a pending script and a single session's calls are
//! serialized. Sessions idle longer than the configured window are swept
//! away together with their workflow.

use crate::error::{not_found_error, AppError};
use crate::workflow::{Collaborators, DeploymentWorkflow};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

pub type SessionHandle = Arc<Mutex<DeploymentWorkflow>>;

struct SessionEntry {
    handle: SessionHandle,
    last_access: Instant,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    deps: Collaborators,
}

impl SessionRegistry {
    pub fn new(deps: Collaborators) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            deps,
        }
    }

    /// Start a fresh workflow in DRAFT and return its id
    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let workflow = DeploymentWorkflow::new(self.deps.clone());
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            id,
            SessionEntry {
                handle: Arc::new(Mutex::new(workflow)),
                last_access: Instant::now(),
            },
        );
        info!("🆕 Session {} created ({} open)", id, sessions.len());
        id
    }

    /// Look up a session and mark it as used
    pub async fn get(&self, id: Uuid) -> Result<SessionHandle, AppError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(&id)
            .ok_or_else(|| not_found_error(format!("Session {} not found", id)))?;
        entry.last_access = Instant::now();
        Ok(entry.handle.clone())
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), AppError> {
        match self.sessions.write().await.remove(&id) {
            Some(_) => {
                info!("Session {} closed", id);
                Ok(())
            }
            None => Err(not_found_error(format!("Session {} not found", id))),
        }
    }

    /// Drop sessions unused for at least `ttl`. A session whose workflow is
    /// locked by a running call is kept. Returns how many were dropped.
    pub async fn sweep_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let expired = entry.last_access.elapsed() >= ttl && entry.handle.try_lock().is_ok();
            if expired {
                info!("⌛ Session {} expired after {:?} idle", id, entry.last_access.elapsed());
            }
            !expired
        });
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SyntaxValidator;
    use crate::audit::MemoryAuditTrail;
    use crate::backup::SchemaCopyBackup;
    use crate::db::fake::FakeDatabase;
    use crate::impact::RowImpactExecutor;
    use crate::snapshot::SchemaSnapshotStore;
    use crate::workflow::WorkflowState;

    fn registry() -> SessionRegistry {
        let db = Arc::new(FakeDatabase::new().with_table("t", &[("id", "integer")]));
        SessionRegistry::new(Collaborators {
            validator: Arc::new(SyntaxValidator::new(db.clone())),
            backup: Arc::new(SchemaCopyBackup::new(db.clone(), "public")),
            audit: Arc::new(MemoryAuditTrail::new()),
            snapshots: SchemaSnapshotStore::new(db.clone(), "public"),
            executor: RowImpactExecutor::new(db),
        })
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let registry = registry();
        let first = registry.create().await;
        let second = registry.create().await;
        assert_ne!(first, second);

        {
            let handle = registry.get(first).await.unwrap();
            let mut workflow = handle.lock().await;
            workflow.set_script("UPDATE t SET id = 2 WHERE id = 1").await;
            assert!(workflow.validate().await.success);
        }

        let first_state = registry.get(first).await.unwrap().lock().await.state();
        let second_state = registry.get(second).await.unwrap().lock().await.state();
        assert_eq!(first_state, WorkflowState::Validated);
        assert_eq!(second_state, WorkflowState::Draft);
    }

    #[tokio::test]
    async fn test_unknown_and_removed_sessions() {
        let registry = registry();
        assert!(matches!(
            registry.get(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));

        let id = registry.create().await;
        registry.remove(id).await.unwrap();
        assert!(registry.get(id).await.is_err());
        assert!(registry.remove(id).await.is_err());
    }

    #[tokio::test]
    async fn test_idle_sessions_are_swept() {
        let registry = registry();
        let id = registry.create().await;

        assert_eq!(registry.sweep_idle(Duration::from_secs(3600)).await, 0);
        assert!(registry.get(id).await.is_ok());

        assert_eq!(registry.sweep_idle(Duration::ZERO).await, 1);
        assert!(matches!(registry.get(id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_busy_session_survives_sweep() {
        let registry = registry();
        let id = registry.create().await;

        let handle = registry.get(id).await.unwrap();
        let guard = handle.lock().await;
        assert_eq!(registry.sweep_idle(Duration::ZERO).await, 0);
        drop(guard);

        assert_eq!(registry.sweep_idle(Duration::ZERO).await, 1);
    }
}
