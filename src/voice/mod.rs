//! Voice output
//!
//! Speech recognition runs in the browser against the STT provider; the
//! gateway only synthesizes replies.

mod tts;

pub use tts::{DEFAULT_BASE_URL, TextToSpeech, TtsSettings};
