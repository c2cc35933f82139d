//! API route handlers
//!
//! Thin adapters from HTTP to the core components:
//! - Guest passes and the gate audit log
//! - Panic alerts (polling and event stream)
//! - Bitácora entries and escalation
//! - Direct classification endpoints

mod alerts;
mod bitacora;
mod classify;
mod gate;
mod health;
mod passes;

pub use alerts::*;
pub use bitacora::*;
pub use classify::*;
pub use gate::*;
pub use health::*;
pub use passes::*;

use std::sync::Arc;
use std::time::Instant;

use axum::response::Response;
use base64::Engine as _;

use super::envelope::ApiErrorResponse;
use crate::services::Services;
use crate::types::ImageInput;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub services: Arc<Services>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services, started_at: Instant::now() }
    }
}

/// Decode a base64 image, accepting either bare base64 or a `data:` URL.
/// A data URL's media type wins over `mime_type`.
pub(crate) fn decode_image(encoded: &str, mime_type: Option<&str>) -> Result<ImageInput, Response> {
    let (mime, payload) = match encoded.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
        Some((header, payload)) => {
            let mime = header.trim_end_matches(";base64").to_string();
            (mime, payload)
        }
        None => (mime_type.unwrap_or("image/jpeg").to_string(), encoded),
    };

    let data = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ApiErrorResponse::bad_request(format!("image is not valid base64: {e}")))?;
    Ok(ImageInput::new(mime, data))
}
