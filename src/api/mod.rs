//! HTTP API server for the Marzelle gateway

mod error;
pub mod health;
pub mod key;
pub mod rate_limit;
pub mod tts;
pub mod websocket;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::chat::ChatRelay;
use crate::conversation::SessionStore;
use crate::voice::TextToSpeech;

pub use error::ApiError;

/// Shared state for API handlers
pub struct ApiState {
    /// Per-connection conversation logs
    pub sessions: Arc<SessionStore>,
    /// Transcript relay; absent when no completion provider is configured
    pub relay: Option<ChatRelay>,
    /// TTS proxy backend; absent when no voice or key is configured
    pub tts: Option<TextToSpeech>,
    /// Speech-to-text key handed to the browser
    pub stt_key: Option<SecretString>,
    pub rate_limiter: Option<rate_limit::SharedLimiter>,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    sessions: Arc<SessionStore>,
    port: u16,
    relay: Option<ChatRelay>,
    tts: Option<TextToSpeech>,
    stt_key: Option<SecretString>,
    static_dir: Option<PathBuf>,
    rate_limit_rpm: Option<u32>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(sessions: Arc<SessionStore>, port: u16) -> Self {
        Self {
            sessions,
            port,
            relay: None,
            tts: None,
            stt_key: None,
            static_dir: None,
            rate_limit_rpm: None,
        }
    }

    /// Set the chat relay for transcripts
    #[must_use]
    pub fn relay(mut self, relay: ChatRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Set the TTS backend
    #[must_use]
    pub fn tts(mut self, tts: TextToSpeech) -> Self {
        self.tts = Some(tts);
        self
    }

    /// Set the speech-to-text key served at `/key`
    #[must_use]
    pub fn stt_key(mut self, key: Option<SecretString>) -> Self {
        self.stt_key = key;
        self
    }

    /// Set the static files directory for serving the browser client
    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Cap requests per minute across all clients
    #[must_use]
    pub fn rate_limit_rpm(mut self, rpm: Option<u32>) -> Self {
        self.rate_limit_rpm = rpm;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let state = Arc::new(ApiState {
            sessions: self.sessions,
            relay: self.relay,
            tts: self.tts,
            stt_key: self.stt_key,
            rate_limiter: self.rate_limit_rpm.map(rate_limit::create_limiter),
        });

        ApiServer {
            state,
            port: self.port,
            static_dir: self.static_dir,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .merge(key::router(self.state.clone()))
            .merge(tts::router(self.state.clone()))
            .merge(websocket::router(self.state.clone()))
            .merge(health::router(self.state.clone()));

        // Serve static files if configured
        if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir =
                ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        let router = router.layer(axum::middleware::from_fn_with_state(
            self.state.clone(),
            rate_limit::rate_limit_middleware,
        ));

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        if self.state.relay.is_none() {
            tracing::warn!("no completion provider configured - transcripts will be rejected");
        }
        if self.state.tts.is_none() {
            tracing::warn!("TTS not configured - /tts will return 503");
        }

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "listening on http://localhost:{}", self.port);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
