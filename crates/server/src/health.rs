use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use fieldrelay_db::{DbPool, SqlSheetStore};
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    store: SqlSheetStore,
}

impl HealthState {
    pub fn new(db_pool: DbPool) -> Self {
        Self { store: SqlSheetStore::new(db_pool) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub store: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState::new(db_pool))
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(state.store.pool()).await;
    let store = store_check(&state.store).await;
    let ready = database.status == "ready" && store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "fieldrelay-server runtime initialized".to_string(),
        },
        database,
        store,
        checked_at: Utc::now().to_rfc3339(),
    };

    if !ready {
        warn!(event_name = "system.health.degraded", correlation_id = "health", "health check degraded");
    }

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn store_check(store: &SqlSheetStore) -> HealthCheck {
    match store.tables().await {
        Ok(tables) => {
            let rows: usize = tables.iter().map(|(_, count)| count).sum();
            HealthCheck {
                status: "ready",
                detail: format!("{} tables, {rows} rows", tables.len()),
            }
        }
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("store unreadable: {error}") }
        }
    }
}
