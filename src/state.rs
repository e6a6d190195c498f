//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::audit::{AuditEntry, AuditTrail};
use crate::db::Database;
use crate::session::SessionRegistry;
use crate::snapshot::SchemaSnapshotStore;
use crate::workflow::Collaborators;
use std::sync::Arc;
use tracing::warn;

/// Application state shared across all handlers
pub struct AppState {
    /// Target database (previews, planner checks)
    pub db: Arc<dyn Database>,

    /// One deployment workflow per operator session
    pub sessions: SessionRegistry,

    /// Audit trail shared with every workflow
    pub audit: Arc<dyn AuditTrail>,

    /// Snapshots of the deployment schema for comparison previews
    pub snapshots: SchemaSnapshotStore,

    /// Row cap for SELECT previews
    pub preview_row_limit: usize,
}

impl AppState {
    pub fn new(db: Arc<dyn Database>, deps: Collaborators, preview_row_limit: usize) -> Self {
        let audit = deps.audit.clone();
        let snapshots = deps.snapshots.clone();

        Self {
            db,
            sessions: SessionRegistry::new(deps),
            audit,
            snapshots,
            preview_row_limit,
        }
    }

    /// Best-effort audit append for actions outside a workflow
    pub async fn record(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        if let Err(e) = self.audit.append(entry).await {
            warn!("Audit append failed for '{}': {}", action, e);
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
