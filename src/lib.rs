//! Marzelle Gateway - voice chat relay for the Marzelle persona
//!
//! This library provides the server side of a browser voice conversation:
//! - Transcript channel: final speech-to-text results arrive over a WebSocket
//! - Chat relay: each transcript is answered by a streaming chat completion
//!   over a bounded per-session conversation log
//! - TTS proxy: replies are synthesized to MP3 for the browser to play
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Browser client                      │
//! │   Mic → STT (direct)  │  /ws transcripts  │  /tts   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Marzelle Gateway                     │
//! │   SessionStore  │  ChatRelay  │  TTS proxy  │  /key │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Upstream providers                    │
//! │   Chat completions (SSE)  │  ElevenLabs TTS         │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod chat;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod voice;

pub use chat::{ChatRelay, RelaySettings};
pub use completion::{CompletionProvider, CompletionRequest, OpenAiProvider};
pub use config::Config;
pub use conversation::{ConversationLog, Role, SessionStore, Turn, WindowPolicy};
pub use error::{Error, Result};
pub use voice::TextToSpeech;
