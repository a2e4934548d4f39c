/*!
 * Health, readiness, and metrics HTTP surface
 *
 * Exposed on its own port alongside the dispatcher so an orchestrator can
 * probe liveness/readiness without going through the (out-of-scope) admin
 * API.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::store::Store;

/// Shared state backing the health/readiness handlers.
#[derive(Clone)]
pub struct ServiceState {
    store: Store,
    ready: Arc<AtomicBool>,
}

impl ServiceState {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Called once the dispatcher's startup sweep has completed and the
    /// worker pool is accepting claims.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Liveness probe — is the process alive?
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "webhook-delivery",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Readiness probe — can this instance accept the claim loop's work?
///
/// Gated on both the dispatcher having completed startup (ready flag) and
/// the store actually being reachable right now.
async fn readiness_check(State(state): State<ServiceState>) -> (StatusCode, Json<Value>) {
    let dispatcher_ready = state.ready.load(Ordering::SeqCst);
    let db_ok = sqlx::query("SELECT 1")
        .execute(state.store.pool())
        .await
        .is_ok();

    if dispatcher_ready && db_ok {
        (
            StatusCode::OK,
            Json(json!({
                "ready": true,
                "service": "webhook-delivery",
                "database": "reachable",
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ready": false,
                "service": "webhook-delivery",
                "dispatcher_initialized": dispatcher_ready,
                "database": if db_ok { "reachable" } else { "unreachable" },
            })),
        )
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    crate::metrics::render_metrics().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
