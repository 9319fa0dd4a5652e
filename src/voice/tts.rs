//! Text-to-speech (TTS) via `ElevenLabs`

use axum::body::Bytes;
use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Default `ElevenLabs` API host
pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

/// Upstream synthesis parameters
#[derive(Debug, Clone)]
pub struct TtsSettings {
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub base_url: String,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            voice_id: String::new(),
            model_id: "eleven_multilingual_v1".to_string(),
            stability: 0.75,
            similarity_boost: 0.75,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    settings: TtsSettings,
}

impl TextToSpeech {
    /// Create a new TTS instance
    ///
    /// # Errors
    ///
    /// Returns error if the API key or voice is missing
    pub fn new(api_key: SecretString, settings: TtsSettings) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }
        if settings.voice_id.is_empty() {
            return Err(Error::Config("ElevenLabs voice ID required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            settings,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.voice_id
        )
    }

    /// Synthesize text to speech
    ///
    /// Returns audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// - `MissingInput` if `text` is blank
    /// - `UpstreamUnavailable` if the provider is unreachable or answers with
    ///   a non-success status
    pub async fn synthesize(&self, text: &str) -> Result<Bytes> {
        #[derive(serde::Serialize)]
        struct VoiceSettings {
            stability: f32,
            similarity_boost: f32,
        }

        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
            voice_settings: VoiceSettings,
        }

        if text.trim().is_empty() {
            return Err(Error::MissingInput("text"));
        }

        let request = ElevenLabsRequest {
            text,
            model_id: &self.settings.model_id,
            voice_settings: VoiceSettings {
                stability: self.settings.stability,
                similarity_boost: self.settings.similarity_boost,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("ElevenLabs unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "TTS upstream error");
            return Err(Error::UpstreamUnavailable(format!(
                "ElevenLabs TTS error {status}"
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("ElevenLabs body failed: {e}")))
    }
}
