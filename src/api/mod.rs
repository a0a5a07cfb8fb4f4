pub mod handlers;

pub use handlers::*;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::db::DeliveryStore;
use crate::service::{AuditLogger, BulkVerifier, ReconciliationScheduler};

/// 共享状态
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<ReconciliationScheduler>,
    pub verifier: BulkVerifier,
    pub deliveries: Arc<dyn DeliveryStore>,
    pub audit: Arc<AuditLogger>,
}

/// 构建路由
pub fn router(state: AppState) -> Router {
    let reconciliation_routes = Router::new()
        .route("/api/reconciliation/trigger", post(trigger_reconciliation))
        .route("/api/reconciliation/status", get(reconciliation_status))
        .route("/api/reconciliation/start", post(start_service))
        .route("/api/reconciliation/stop", post(stop_service))
        .route("/api/reconciliation/runs", get(list_runs))
        .route("/api/reconciliation/runs/export", get(export_runs));

    let verification_routes = Router::new()
        .route("/api/verification/bulk", post(bulk_verify))
        .route("/api/verification/cache/stats", get(cache_stats))
        .route("/api/verification/cache", delete(cleanup_cache))
        .route("/api/verification/:delivery_id", get(get_verification))
        .route("/api/verification/:delivery_id/cache", delete(invalidate_verification));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/audit/recent", get(recent_audit))
        .merge(reconciliation_routes)
        .merge(verification_routes)
        .with_state(state)
}
