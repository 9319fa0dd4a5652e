//! Chat relay: one transcript in, one persona reply out
//!
//! A turn appends the user's text to the session log, trims the log to the
//! window, streams a completion over the trimmed log, and records the full
//! reply as an assistant turn.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::completion::{CompletionProvider, CompletionRequest, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use crate::conversation::{ConversationLog, DEFAULT_WINDOW, Turn};
use crate::{Error, Result};

/// Reply sent when a completion fails
pub const DEFAULT_FALLBACK_REPLY: &str = "Oops, something broke in Marzelle's mind.";

/// Default bound on a single relay turn
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed parameters for every relay turn
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub model: String,
    pub temperature: f32,
    pub window: usize,
    pub timeout: Duration,
    pub fallback_reply: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            window: DEFAULT_WINDOW,
            timeout: DEFAULT_TIMEOUT,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }
}

/// Bridges transcripts to a completion provider
#[derive(Clone)]
pub struct ChatRelay {
    provider: Arc<dyn CompletionProvider>,
    settings: RelaySettings,
}

impl ChatRelay {
    #[must_use]
    pub fn new(provider: Arc<dyn CompletionProvider>, settings: RelaySettings) -> Self {
        Self { provider, settings }
    }

    /// Run one turn and return the assistant's reply
    ///
    /// The caller holds the session lock for the whole turn, so turns of one
    /// session never interleave.
    ///
    /// # Errors
    ///
    /// - `MissingInput` if `user_text` is blank; the log is left untouched
    /// - `CompletionFailure` if the provider call or its stream fails
    /// - `CompletionTimeout` if the turn exceeds the configured bound
    ///
    /// On a completion error the user turn stays in the log and no assistant
    /// turn is added.
    pub async fn ask(&self, log: &mut ConversationLog, user_text: &str) -> Result<String> {
        if user_text.trim().is_empty() {
            return Err(Error::MissingInput("transcript"));
        }

        log.append(Turn::user(user_text));
        log.truncate_to_window(self.settings.window);

        let request = CompletionRequest::streaming(
            self.settings.model.clone(),
            self.settings.temperature,
            log.snapshot(),
        );

        let reply = tokio::time::timeout(self.settings.timeout, self.collect(&request))
            .await
            .map_err(|_| Error::CompletionTimeout(self.settings.timeout))??;

        log.append(Turn::assistant(reply.clone()));
        Ok(reply)
    }

    /// Consume the provider stream into one string, in arrival order
    async fn collect(&self, request: &CompletionRequest) -> Result<String> {
        let mut stream = self.provider.stream(request).await.map_err(into_completion_error)?;

        let mut reply = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment.map_err(into_completion_error)?;
            reply.push_str(&fragment);
        }

        tracing::debug!(
            provider = self.provider.name(),
            reply_len = reply.len(),
            "completion stream finished"
        );
        Ok(reply)
    }

    /// Resolve a turn's outcome to the text the client should hear
    ///
    /// Completion errors become the fallback reply. Other errors are returned
    /// unchanged for the transport to report.
    ///
    /// # Errors
    ///
    /// Returns the original error if it did not come from the completion path
    pub fn reply_or_fallback(&self, outcome: Result<String>) -> Result<String> {
        match outcome {
            Ok(reply) => Ok(reply),
            Err(e) if e.is_completion_error() => {
                tracing::error!(error = %e, "chat relay failed, sending fallback reply");
                Ok(self.settings.fallback_reply.clone())
            }
            Err(e) => Err(e),
        }
    }
}

/// Anything raised while talking to the provider is a completion failure
fn into_completion_error(e: Error) -> Error {
    match e {
        e @ (Error::CompletionFailure(_) | Error::CompletionTimeout(_)) => e,
        other => Error::CompletionFailure(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream;

    use super::*;
    use crate::completion::TokenStream;
    use crate::conversation::{Role, WindowPolicy};

    /// Provider that replays a fixed script and records requests
    struct Scripted {
        fragments: Vec<Result<&'static str>>,
        fail_to_start: bool,
        delay: Option<Duration>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn ok(fragments: &[&'static str]) -> Self {
            Self {
                fragments: fragments.iter().copied().map(Ok).collect(),
                fail_to_start: false,
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for Scripted {
        async fn stream(&self, request: &CompletionRequest) -> Result<TokenStream> {
            self.seen.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_to_start {
                return Err(Error::CompletionFailure("connection refused".to_string()));
            }
            let items: Vec<Result<String>> = self
                .fragments
                .iter()
                .map(|f| match f {
                    Ok(s) => Ok((*s).to_string()),
                    Err(e) => Err(Error::CompletionFailure(e.to_string())),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn relay(provider: Arc<Scripted>) -> ChatRelay {
        ChatRelay::new(provider, RelaySettings::default())
    }

    fn log() -> ConversationLog {
        ConversationLog::new("You are Marzelle.", WindowPolicy::PinSystem)
    }

    #[tokio::test]
    async fn concatenates_fragments_in_order() {
        let provider = Arc::new(Scripted::ok(&["Hel", "lo", " there"]));
        let mut log = log();

        let reply = relay(provider).ask(&mut log, "hi").await.unwrap();

        assert_eq!(reply, "Hello there");
        assert_eq!(log.len(), 3);
        assert_eq!(log.last(), Some(&Turn::assistant("Hello there")));
    }

    #[tokio::test]
    async fn sends_fixed_parameters_and_snapshot() {
        let provider = Arc::new(Scripted::ok(&["ok"]));
        let mut log = log();

        relay(provider.clone()).ask(&mut log, "hello").await.unwrap();

        let seen = provider.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.model, "gpt-4o");
        assert!((request.temperature - 0.6).abs() < f32::EPSILON);
        assert!(request.stream);
        assert_eq!(
            request.messages,
            vec![Turn::system("You are Marzelle."), Turn::user("hello")]
        );
    }

    #[tokio::test]
    async fn failure_before_any_fragment_keeps_user_turn_only() {
        let provider = Arc::new(Scripted {
            fail_to_start: true,
            ..Scripted::ok(&[])
        });
        let relay = relay(provider);
        let mut log = log();

        let outcome = relay.ask(&mut log, "hello?").await;

        assert!(matches!(outcome, Err(Error::CompletionFailure(_))));
        assert_eq!(log.len(), 2);
        assert_eq!(log.last().map(|t| t.role), Some(Role::User));
        assert_eq!(
            relay.reply_or_fallback(outcome).unwrap(),
            DEFAULT_FALLBACK_REPLY
        );
    }

    #[tokio::test]
    async fn mid_stream_fault_discards_partial_reply() {
        let provider = Arc::new(Scripted {
            fragments: vec![Ok("partial"), Err(Error::MissingInput("boom"))],
            ..Scripted::ok(&[])
        });
        let mut log = log();

        let outcome = relay(provider).ask(&mut log, "go").await;

        assert!(matches!(outcome, Err(Error::CompletionFailure(_))));
        assert!(log.turns().iter().all(|t| t.content != "partial"));
        assert_eq!(log.last(), Some(&Turn::user("go")));
    }

    #[tokio::test]
    async fn blank_transcript_is_rejected_without_mutation() {
        let provider = Arc::new(Scripted::ok(&["never"]));
        let relay = relay(provider.clone());
        let mut log = log();

        for input in ["", "   ", "\n\t"] {
            let outcome = relay.ask(&mut log, input).await;
            assert!(matches!(outcome, Err(Error::MissingInput(_))));
            assert!(relay.reply_or_fallback(outcome).is_err());
        }

        assert_eq!(log.len(), 1);
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let provider = Arc::new(Scripted {
            delay: Some(Duration::from_secs(60)),
            ..Scripted::ok(&["late"])
        });
        let relay = ChatRelay::new(
            provider,
            RelaySettings {
                timeout: Duration::from_secs(5),
                ..RelaySettings::default()
            },
        );
        let mut log = log();

        let outcome = relay.ask(&mut log, "anyone there").await;

        assert!(matches!(outcome, Err(Error::CompletionTimeout(d)) if d == Duration::from_secs(5)));
        assert_eq!(log.last(), Some(&Turn::user("anyone there")));
        assert_eq!(
            relay.reply_or_fallback(outcome).unwrap(),
            DEFAULT_FALLBACK_REPLY
        );
    }

    #[tokio::test]
    async fn window_is_applied_before_the_request() {
        let provider = Arc::new(Scripted::ok(&["a"]));
        let relay = ChatRelay::new(
            provider.clone(),
            RelaySettings {
                window: 3,
                ..RelaySettings::default()
            },
        );
        let mut log = log();

        for i in 0..4 {
            relay.ask(&mut log, &format!("q{i}")).await.unwrap();
        }

        let seen = provider.seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last.messages.len(), 3);
        assert_eq!(last.messages[0].role, Role::System);
        assert_eq!(last.messages[2], Turn::user("q3"));
    }

    #[tokio::test]
    async fn tiny_pinned_window_still_sends_the_transcript() {
        let provider = Arc::new(Scripted::ok(&["x"]));
        let relay = ChatRelay::new(
            provider.clone(),
            RelaySettings {
                window: 1,
                ..RelaySettings::default()
            },
        );
        let mut log = log();

        relay.ask(&mut log, "hello").await.unwrap();

        let seen = provider.seen.lock().unwrap();
        assert_eq!(
            seen[0].messages,
            vec![Turn::system("You are Marzelle."), Turn::user("hello")]
        );
        let roles: Vec<Role> = log.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant]);
    }
}
