//! `OpenAI`-compatible streaming chat completions

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::retry::{self, RetryPolicy};
use super::{CompletionProvider, CompletionRequest, TokenStream};
use crate::{Error, Result};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// One decoded server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload
    Data(String),
    /// The `data: [DONE]` terminator
    Done,
}

/// Incremental server-sent-events decoder
///
/// Network chunks may split a line (or a multi-byte character) anywhere, so
/// bytes are buffered until a full line is available.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = Self::parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        Self::parse_line(&line)
    }

    fn parse_line(line: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);
        let data = line.strip_prefix("data:")?.trim_start();

        if data == "[DONE]" {
            Some(SseEvent::Done)
        } else if data.is_empty() {
            None
        } else {
            Some(SseEvent::Data(data.to_string()))
        }
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    message: String,
}

/// What one `data:` payload contributes to the reply
#[derive(Debug, PartialEq, Eq)]
struct ChunkContent {
    text: Option<String>,
    finished: bool,
}

fn parse_chunk(data: &str) -> Result<ChunkContent> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| Error::CompletionFailure(format!("malformed stream event: {e}")))?;

    if let Some(err) = chunk.error {
        return Err(Error::CompletionFailure(err.message));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(ChunkContent {
            text: None,
            finished: false,
        });
    };

    Ok(ChunkContent {
        text: choice.delta.content.filter(|c| !c.is_empty()),
        finished: choice.finish_reason.is_some(),
    })
}

/// Chat-completion client for the `OpenAI` API and compatible servers
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    /// Create a provider against `base_url` (e.g. `https://api.openai.com/v1`)
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty or the HTTP client cannot be built
    pub fn new(api_key: SecretString, base_url: &str, retry: RetryPolicy) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for chat completions".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            retry,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send the request, retrying connection failures and 429/5xx answers
    async fn send_with_retry(&self, request: &CompletionRequest) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            let sent = self
                .client
                .post(&self.endpoint)
                .bearer_auth(self.api_key.expose_secret())
                .json(request)
                .send()
                .await;

            let can_retry = attempt < self.retry.max_retries;

            match sent {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if can_retry && retry::is_retryable_status(response.status().as_u16()) => {
                    tracing::warn!(
                        status = %response.status(),
                        attempt = attempt + 1,
                        "completion request rejected, retrying"
                    );
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::CompletionFailure(format!(
                        "provider returned {status}: {body}"
                    )));
                }
                Err(e) if can_retry && retry::is_retryable_error(&e) => {
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        "completion request failed, retrying"
                    );
                }
                Err(e) => {
                    return Err(Error::CompletionFailure(format!("request failed: {e}")));
                }
            }

            tokio::time::sleep(retry::delay_for_attempt(&self.retry, attempt)).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn stream(&self, request: &CompletionRequest) -> Result<TokenStream> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "starting completion stream"
        );

        let response = self.send_with_retry(request).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(pump_events(response, tx));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Forward decoded fragments until `[DONE]`, a fault, or the receiver goes away
async fn pump_events(response: reqwest::Response, tx: mpsc::Sender<Result<String>>) {
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    let mut finished = false;

    loop {
        // Stop reading as soon as the relay drops the stream (e.g. on timeout)
        let next = tokio::select! {
            () = tx.closed() => {
                tracing::debug!("completion stream dropped, closing upstream body");
                return;
            }
            next = body.next() => next,
        };
        let Some(chunk) = next else { break };

        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx
                    .send(Err(Error::CompletionFailure(format!("stream interrupted: {e}"))))
                    .await;
                return;
            }
        };

        for event in decoder.push(&chunk) {
            match forward(event, &tx, &mut finished).await {
                Flow::Continue => {}
                Flow::Stop => return,
            }
        }
    }

    if let Some(event) = decoder.finish() {
        if matches!(forward(event, &tx, &mut finished).await, Flow::Stop) {
            return;
        }
    }

    if !finished {
        let _ = tx
            .send(Err(Error::CompletionFailure(
                "stream ended before completion".to_string(),
            )))
            .await;
    }
}

enum Flow {
    Continue,
    Stop,
}

async fn forward(event: SseEvent, tx: &mpsc::Sender<Result<String>>, finished: &mut bool) -> Flow {
    let data = match event {
        SseEvent::Done => return Flow::Stop,
        SseEvent::Data(data) => data,
    };

    match parse_chunk(&data) {
        Ok(content) => {
            *finished |= content.finished;
            if let Some(text) = content.text {
                if tx.send(Ok(text)).await.is_err() {
                    return Flow::Stop;
                }
            }
            Flow::Continue
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            Flow::Stop
        }
    }
}
