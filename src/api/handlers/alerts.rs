//! Panic alert endpoints
//!
//! Administrators either poll `/alerts/active` every `poll_interval_secs` or
//! hold an SSE connection on `/alerts/stream`.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Response;
use axum::Json;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::ApiState;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::types::PanicAlert;

#[derive(Debug, Deserialize)]
pub struct RaiseRequest {
    pub guard_id: String,
    pub condominio_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    pub cleared_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActiveAlerts {
    pub alerts: Vec<PanicAlert>,
    pub poll_interval_secs: u64,
}

/// POST /api/v2/alerts
pub async fn raise_alert(State(state): State<ApiState>, Json(req): Json<RaiseRequest>) -> Response {
    match state.services.alerts.raise(&req.guard_id, &req.condominio_id).await {
        Ok(alert) => ApiResponse::created(alert),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}

/// POST /api/v2/alerts/:id/clear. Body is optional.
pub async fn clear_alert(
    State(state): State<ApiState>,
    Path(alert_id): Path<String>,
    body: Option<Json<ClearRequest>>,
) -> Response {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    match state.services.alerts.clear(&alert_id, req.cleared_by.as_deref()).await {
        Ok(alert) => ApiResponse::ok(alert),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}

/// GET /api/v2/condominios/:id/alerts/active
pub async fn active_alerts(
    State(state): State<ApiState>,
    Path(condominio_id): Path<String>,
) -> Response {
    match state.services.alerts.list_active(&condominio_id).await {
        Ok(alerts) => ApiResponse::ok(ActiveAlerts {
            alerts,
            poll_interval_secs: state.services.poll_interval_secs,
        }),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}

/// GET /api/v2/condominios/:id/alerts/history
pub async fn alert_history(
    State(state): State<ApiState>,
    Path(condominio_id): Path<String>,
) -> Response {
    match state.services.alerts.history(&condominio_id).await {
        Ok(alerts) => ApiResponse::ok(alerts),
        Err(e) => ApiErrorResponse::from_core(&e),
    }
}

/// GET /api/v2/condominios/:id/alerts/stream
///
/// One SSE event per state change in the condominium, named `raised` or
/// `cleared`, carrying the JSON-encoded [`crate::types::AlertEvent`].
pub async fn alert_stream(
    State(state): State<ApiState>,
    Path(condominio_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.services.alerts.subscribe();

    let events = stream::unfold((rx, condominio_id), |(mut rx, condominio_id)| async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.condominio_id() == condominio_id => {
                    let sse = match Event::default().event(event.name()).json_data(&event) {
                        Ok(sse) => sse,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode alert event");
                            continue;
                        }
                    };
                    return Some((Ok(sse), (rx, condominio_id)));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(condominio = %condominio_id, skipped, "Alert stream subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
