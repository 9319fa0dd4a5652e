//! Text-to-speech proxy endpoint

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;

use super::{ApiError, ApiState};

/// Synthesis request
#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    #[serde(default)]
    pub text: Option<String>,
}

/// Synthesize text to speech
///
/// Returns audio in MP3 format
async fn synthesize(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SynthesizeRequest>,
) -> Result<Response, ApiError> {
    let text = request
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or(crate::Error::MissingInput("text"))?;

    let tts = state
        .tts
        .as_ref()
        .ok_or(ApiError::NotConfigured("TTS not configured"))?;

    tracing::debug!(text_len = text.len(), "synthesizing reply");

    let audio = tts.synthesize(&text).await?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

/// Build TTS router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/tts", post(synthesize))
        .with_state(state)
}
