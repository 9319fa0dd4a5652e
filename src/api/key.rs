//! Speech-to-text credential endpoint
//!
//! The browser opens its own live-transcription socket with the key served
//! here.

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use secrecy::ExposeSecret;
use serde::Serialize;

use super::{ApiError, ApiState};

/// Credential response
#[derive(Debug, Serialize)]
pub struct KeyResponse {
    pub key: String,
}

/// Hand the configured STT key to the caller
async fn key(State(state): State<Arc<ApiState>>) -> Result<Json<KeyResponse>, ApiError> {
    let key = state
        .stt_key
        .as_ref()
        .ok_or(ApiError::NotConfigured("speech-to-text key not configured"))?;

    Ok(Json(KeyResponse {
        key: key.expose_secret().to_string(),
    }))
}

/// Build credential router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/key", get(key)).with_state(state)
}
