use std::sync::Arc;

use fieldrelay_core::config::{AppConfig, ConfigError, LoadOptions};
use fieldrelay_core::notify::{MessageRenderer, NotificationDispatcher, TemplateError};
use fieldrelay_core::{
    ApplicationError, AuditSink, LocationMap, Store, TracingAuditSink, WorkflowEngine,
};
use fieldrelay_db::{connect_with_config, migrations, DbPool, SqlSheetStore};
use fieldrelay_whatsapp::{build_messenger, ClientError};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: WorkflowEngine,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("message templates failed to compile: {0}")]
    Templates(#[from] TemplateError),
    #[error("messenger setup failed: {0}")]
    Messenger(#[from] ClientError),
    #[error("store initialisation failed: {0}")]
    Store(#[from] ApplicationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let catalog = Arc::new(config.workflows.clone());
    let renderer = Arc::new(MessageRenderer::new(&catalog)?);
    let messenger = build_messenger(&config.messaging)?;
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let store: Arc<dyn Store> = Arc::new(SqlSheetStore::new(db_pool.clone()));

    let engine = WorkflowEngine::new(
        store.clone(),
        catalog,
        Arc::new(config.organization.clone()),
        NotificationDispatcher::new(messenger, renderer, audit.clone()),
        Arc::new(config.workflow.clock()),
        audit,
    );
    engine.ensure_tables().await?;
    info!(
        event_name = "system.bootstrap.engine_ready",
        correlation_id = "bootstrap",
        workflows = engine.catalog().definitions().len(),
        messaging_provider = ?config.messaging.provider,
        "workflow engine ready"
    );

    report_hierarchy_integrity(store.as_ref()).await;

    Ok(Application { config, db_pool, engine })
}

async fn report_hierarchy_integrity(store: &dyn Store) {
    match LocationMap::load(store).await {
        Ok(map) => {
            for violation in map.violations() {
                warn!(
                    event_name = "hierarchy.integrity.violation",
                    correlation_id = "bootstrap",
                    child_level = %violation.child_level,
                    child = %violation.child,
                    parent_level = %violation.parent_level,
                    parents = ?violation.parents,
                    "location map value has more than one parent"
                );
            }
        }
        Err(error) => warn!(
            event_name = "hierarchy.integrity.unchecked",
            correlation_id = "bootstrap",
            error = %error,
            "location map could not be read at startup"
        ),
    }
}
