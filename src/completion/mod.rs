//! Streaming chat-completion providers

mod openai;
pub mod retry;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::Result;
use crate::conversation::Turn;

pub use openai::{DEFAULT_BASE_URL, OpenAiProvider, SseDecoder, SseEvent};
pub use retry::RetryPolicy;

/// Default model identifier
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.6;

/// Incremental text fragments, terminated by end of stream
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A streaming chat-completion request
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Turn>,
    pub temperature: f32,
    pub stream: bool,
}

impl CompletionRequest {
    /// Build a streaming request over a message log
    #[must_use]
    pub fn streaming(model: impl Into<String>, temperature: f32, messages: Vec<Turn>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature,
            stream: true,
        }
    }
}

/// A language-model backend that answers with a token stream
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Start a completion and return its fragment stream
    ///
    /// # Errors
    ///
    /// Returns `CompletionFailure` if the request cannot be started
    async fn stream(&self, request: &CompletionRequest) -> Result<TokenStream>;

    /// Provider name for logs
    fn name(&self) -> &'static str;
}
