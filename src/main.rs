//! SQL Deployment Manager
//!
//! Takes a SQL change script through validate → backup → approve → deploy
//! against one PostgreSQL database, and reports what the deploy changed:
//! a schema diff from before/after snapshots and per-kind affected-row
//! counts. Every step lands in an audit trail.

mod analysis;
mod audit;
mod backup;
mod config;
mod db;
mod error;
mod impact;
mod models;
mod routes;
mod session;
mod snapshot;
mod state;
mod workflow;

use crate::analysis::SyntaxValidator;
use crate::audit::{AuditTrail, MemoryAuditTrail, PgAuditTrail};
use crate::backup::{BackupProvider, PgDumpBackup, SchemaCopyBackup};
use crate::config::{AuditStore, BackupStrategy, Settings};
use crate::db::{Database, PgDatabase};
use crate::impact::RowImpactExecutor;
use crate::routes::create_router;
use crate::snapshot::SchemaSnapshotStore;
use crate::state::{AppState, SharedState};
use crate::workflow::Collaborators;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🚀 Starting SQL Deployment Manager...");

    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    let pool = PgDatabase::create_pool(&settings.database)
        .map_err(|e| anyhow::anyhow!("Failed to create pool: {}", e))?;
    let database = PgDatabase::new(pool.clone());
    if let Err(e) = database.ping().await {
        error!("❌ FATAL: Cannot reach the target database: {}", e);
        return Err(anyhow::anyhow!("Database connection check failed: {}", e));
    }
    info!("✅ Database connection successful (TLS: {})", settings.database.require_tls);

    let db: Arc<dyn Database> = Arc::new(database);
    let audit = init_audit_trail(&settings, pool).await;
    let backup = init_backup(&settings, db.clone());

    let deps = Collaborators {
        validator: Arc::new(SyntaxValidator::new(db.clone())),
        backup,
        audit,
        snapshots: SchemaSnapshotStore::new(db.clone(), settings.deployment.schema.clone()),
        executor: RowImpactExecutor::new(db.clone()),
    };
    let state = Arc::new(AppState::new(db, deps, settings.deployment.preview_row_limit));
    spawn_session_sweeper(state.clone(), settings.deployment.session_idle());

    let app = create_router(state, &settings);
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("📚 API Endpoints:");
    info!("   POST   /api/sessions                          - Open a deployment session");
    info!("   PUT    /api/sessions/{{id}}/script              - Upload the SQL script");
    info!("   POST   /api/sessions/{{id}}/workflow/{{action}}   - validate | backup | approve | deploy | reset");
    info!("   GET    /api/sessions/{{id}}/workflow            - State, log and deployment report");
    info!("   POST   /api/analysis | /api/compare | /api/preview");
    info!("   GET    /api/history                           - Audit trail");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlflow_deploy=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Persistent trail when configured and reachable, in-memory otherwise
async fn init_audit_trail(settings: &Settings, pool: deadpool_postgres::Pool) -> Arc<dyn AuditTrail> {
    match settings.deployment.audit_store {
        AuditStore::Postgres => {
            let trail = PgAuditTrail::new(pool);
            match trail.ensure_schema().await {
                Ok(()) => {
                    info!("🗂️  Audit trail stored in deployment_history");
                    Arc::new(trail)
                }
                Err(e) => {
                    warn!("⚠️  Could not prepare deployment_history ({}), keeping audit in memory", e);
                    Arc::new(MemoryAuditTrail::new())
                }
            }
        }
        AuditStore::Memory => {
            info!("🗂️  Audit trail kept in memory");
            Arc::new(MemoryAuditTrail::new())
        }
    }
}

fn init_backup(settings: &Settings, db: Arc<dyn Database>) -> Arc<dyn BackupProvider> {
    match settings.deployment.backup_strategy {
        BackupStrategy::PgDump => {
            info!(
                "💾 Backups via {} into {}",
                settings.deployment.pg_dump_path,
                settings.deployment.backup_dir.display()
            );
            Arc::new(PgDumpBackup::new(&settings.deployment, settings.database.clone()))
        }
        BackupStrategy::SchemaCopy => {
            let backup = SchemaCopyBackup::new(db, settings.deployment.schema.clone());
            info!("💾 Backups copied into schema '{}'", backup.backup_schema());
            Arc::new(backup)
        }
    }
}

/// Periodically drop sessions that have been idle for `ttl`
fn spawn_session_sweeper(state: SharedState, ttl: Duration) {
    info!("⏱️  Idle sessions expire after {}s", ttl.as_secs());
    let period = (ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let expired = state.sessions.sweep_idle(ttl).await;
            if expired > 0 {
                info!("🧹 Dropped {} idle session(s)", expired);
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
