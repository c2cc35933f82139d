//! v2 API route table.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ApiState};

/// Build the v2 API router.
pub fn v2_api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Guest passes
        .route("/passes", post(handlers::issue_pass))
        .route(
            "/passes/:token",
            get(handlers::get_pass).delete(handlers::revoke_pass),
        )
        .route("/condominios/:id/passes", get(handlers::list_passes))
        // Gate
        .route("/gate/admit", post(handlers::admit))
        .route("/gate/vehicle-scan", post(handlers::vehicle_scan))
        .route("/condominios/:id/registrations", get(handlers::list_registrations))
        // Panic alerts
        .route("/alerts", post(handlers::raise_alert))
        .route("/alerts/:id/clear", post(handlers::clear_alert))
        .route("/condominios/:id/alerts/active", get(handlers::active_alerts))
        .route("/condominios/:id/alerts/history", get(handlers::alert_history))
        .route("/condominios/:id/alerts/stream", get(handlers::alert_stream))
        // Bitácora
        .route("/bitacora", post(handlers::record_entry))
        .route("/bitacora/:id", get(handlers::get_entry))
        .route("/bitacora/:id/escalate", post(handlers::escalate_entry))
        .route(
            "/condominios/:id/bitacora/escalate-pending",
            post(handlers::escalate_pending),
        )
        // Classification
        .route("/classify/payroll", post(handlers::classify_payroll))
        .route("/classify/document", post(handlers::classify_document))
        .with_state(state)
}
