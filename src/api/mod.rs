//! REST API module using Axum
//!
//! A thin presentation boundary over the core components: every handler
//! parses input, calls one operation, and wraps the result in the v2
//! envelope. No business rules live here.

pub mod envelope;
pub mod handlers;
mod v2_routes;

pub use handlers::ApiState;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::defaults::MAX_REQUEST_BODY_BYTES;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `CASETA_CORS_ORIGINS` to a comma-separated list of allowed origins,
/// e.g. the administrator web app during development.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match std::env::var("CASETA_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api/v2", v2_routes::v2_api_routes(state))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
