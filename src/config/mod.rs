//! Configuration management for the Marzelle gateway
//!
//! Values resolve env > TOML file > default.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::chat::{DEFAULT_FALLBACK_REPLY, RelaySettings};
use crate::completion::{DEFAULT_MODEL, DEFAULT_TEMPERATURE, RetryPolicy};
use crate::conversation::{DEFAULT_WINDOW, WindowPolicy};
use crate::voice::TtsSettings;
use crate::{Error, Result};

pub use file::ConfigFile;

/// Persona prompt anchoring every conversation
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Marzelle, an eccentric glass-mosaic alien producer. \
     Speak in clipped, dry sentences. End jokes with a soft robotic chuckle: *k-ch*.";

/// Default listening port
pub const DEFAULT_PORT: u16 = 3000;

/// Gateway configuration
#[derive(Debug)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Chat relay configuration
    pub chat: ChatConfig,

    /// Text-to-speech configuration
    pub tts: TtsConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (browser client)
    pub static_dir: Option<PathBuf>,

    /// Global request cap per minute; `None` disables limiting
    pub rate_limit_rpm: Option<u32>,
}

/// Chat relay configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub model: String,
    pub temperature: f32,
    pub window: usize,
    pub window_policy: WindowPolicy,
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_url: String,
    pub system_prompt: String,
    pub fallback_reply: String,
}

/// Text-to-speech configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// `ElevenLabs` voice; TTS is disabled without one
    pub voice_id: Option<String>,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub base_url: String,
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (chat completions)
    pub openai: Option<SecretString>,

    /// `Deepgram` API key, handed to the browser for live transcription
    pub deepgram: Option<SecretString>,

    /// `ElevenLabs` API key (TTS)
    pub elevenlabs: Option<SecretString>,
}

impl Config {
    /// Load configuration from the environment and the TOML file
    ///
    /// An explicit `path` must exist; otherwise the standard location is used
    /// if present.
    ///
    /// # Errors
    ///
    /// Returns error if the explicit file cannot be loaded or a value is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::load_from(path)?,
            None => file::load_config_file(),
        };
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range or unparseable
    pub fn from_sources(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let first = |keys: &[&str]| keys.iter().find_map(|k| env(k).filter(|v| !v.is_empty()));

        let port = match first(&["MARZELLE_PORT", "PORT"]) {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid port: {raw}")))?,
            None => fc.server.port.unwrap_or(DEFAULT_PORT),
        };

        let static_dir = first(&["MARZELLE_STATIC_DIR"])
            .map(PathBuf::from)
            .or(fc.server.static_dir)
            .or_else(|| {
                let public = PathBuf::from("public");
                public.is_dir().then_some(public)
            });

        let rate_limit_rpm = match first(&["MARZELLE_RATE_LIMIT_RPM"]) {
            Some(raw) => Some(
                raw.parse()
                    .map_err(|_| Error::Config(format!("invalid rate limit: {raw}")))?,
            ),
            None => fc.server.rate_limit_rpm,
        }
        .filter(|rpm| *rpm > 0);

        let server = ServerConfig {
            port,
            static_dir,
            rate_limit_rpm,
        };

        let window_policy: WindowPolicy = fc
            .chat
            .window_policy
            .as_deref()
            .map(str::parse::<WindowPolicy>)
            .transpose()?
            .unwrap_or_default();

        let window = match first(&["MARZELLE_WINDOW"]) {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid window: {raw}")))?,
            None => fc.chat.window.unwrap_or(DEFAULT_WINDOW),
        };
        // A pinned window needs room for the system turn and the newest turn
        let min_window = match window_policy {
            WindowPolicy::PinSystem => 2,
            WindowPolicy::Sliding => 1,
        };
        if window < min_window {
            return Err(Error::Config(format!(
                "chat.window must be at least {min_window} for the {} policy, got {window}",
                window_policy.as_str()
            )));
        }

        let temperature = fc.chat.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(Error::Config(format!(
                "chat.temperature must be within 0.0..=2.0, got {temperature}"
            )));
        }

        let timeout_secs = match first(&["MARZELLE_TIMEOUT_SECS"]) {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid timeout: {raw}")))?,
            None => fc.chat.timeout_secs.unwrap_or(30),
        };
        if timeout_secs == 0 {
            return Err(Error::Config("chat.timeout_secs must be at least 1".to_string()));
        }

        let chat = ChatConfig {
            model: first(&["MARZELLE_MODEL"])
                .or(fc.chat.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            window,
            window_policy,
            timeout: Duration::from_secs(timeout_secs),
            max_retries: fc
                .chat
                .max_retries
                .unwrap_or_else(|| RetryPolicy::default().max_retries),
            base_url: first(&["OPENAI_BASE_URL"])
                .or(fc.chat.base_url)
                .unwrap_or_else(|| crate::completion::DEFAULT_BASE_URL.to_string()),
            system_prompt: first(&["MARZELLE_SYSTEM_PROMPT"])
                .or(fc.chat.system_prompt)
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            fallback_reply: fc
                .chat
                .fallback_reply
                .unwrap_or_else(|| DEFAULT_FALLBACK_REPLY.to_string()),
        };

        let defaults = TtsSettings::default();
        let tts = TtsConfig {
            voice_id: first(&["ELEVEN_VOICE_ID"]).or(fc.tts.voice_id),
            model_id: fc.tts.model_id.unwrap_or(defaults.model_id),
            stability: fc.tts.stability.unwrap_or(defaults.stability),
            similarity_boost: fc.tts.similarity_boost.unwrap_or(defaults.similarity_boost),
            base_url: first(&["ELEVEN_BASE_URL"])
                .or(fc.tts.base_url)
                .unwrap_or(defaults.base_url),
        };

        let api_keys = ApiKeys {
            openai: first(&["OPENAI_KEY", "OPENAI_API_KEY"])
                .or(fc.api_keys.openai)
                .map(SecretString::from),
            deepgram: first(&["DEEPGRAM_API_KEY"])
                .or(fc.api_keys.deepgram)
                .map(SecretString::from),
            elevenlabs: first(&["ELEVEN_KEY", "ELEVENLABS_API_KEY"])
                .or(fc.api_keys.elevenlabs)
                .map(SecretString::from),
        };

        Ok(Self {
            server,
            chat,
            tts,
            api_keys,
        })
    }

    /// Fixed parameters for the chat relay
    #[must_use]
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            model: self.chat.model.clone(),
            temperature: self.chat.temperature,
            window: self.chat.window,
            timeout: self.chat.timeout,
            fallback_reply: self.chat.fallback_reply.clone(),
        }
    }

    /// Retry policy for opening completion streams
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.chat.max_retries,
            ..RetryPolicy::default()
        }
    }

    /// Upstream TTS parameters, if a voice is configured
    #[must_use]
    pub fn tts_settings(&self) -> Option<TtsSettings> {
        let voice_id = self.tts.voice_id.clone()?;
        Some(TtsSettings {
            voice_id,
            model_id: self.tts.model_id.clone(),
            stability: self.tts.stability,
            similarity_boost: self.tts.similarity_boost,
            base_url: self.tts.base_url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_behaviour() {
        let config = Config::from_sources(ConfigFile::default(), env_from(&[])).unwrap();

        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.chat.model, "gpt-4o");
        assert!((config.chat.temperature - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.chat.window, 10);
        assert_eq!(config.chat.window_policy, WindowPolicy::PinSystem);
        assert_eq!(config.chat.timeout, Duration::from_secs(30));
        assert_eq!(config.chat.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.tts.model_id, "eleven_multilingual_v1");
        assert!(config.tts_settings().is_none());
        assert!(config.api_keys.openai.is_none());
        assert!(config.server.rate_limit_rpm.is_none());
    }

    #[test]
    fn env_overrides_file() {
        let fc: ConfigFile = toml::from_str(
            r#"
            [server]
            port = 4000

            [chat]
            model = "from-file"
            window_policy = "sliding"

            [api_keys]
            openai = "file-key"
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            fc,
            env_from(&[
                ("PORT", "5050"),
                ("MARZELLE_MODEL", "from-env"),
                ("OPENAI_KEY", "env-key"),
                ("ELEVEN_VOICE_ID", "voice-1"),
            ]),
        )
        .unwrap();

        assert_eq!(config.server.port, 5050);
        assert_eq!(config.chat.model, "from-env");
        assert_eq!(config.chat.window_policy, WindowPolicy::Sliding);
        assert_eq!(
            config.api_keys.openai.as_ref().map(|k| k.expose_secret()),
            Some("env-key")
        );
        assert_eq!(config.tts_settings().map(|t| t.voice_id).as_deref(), Some("voice-1"));
    }

    #[test]
    fn marzelle_port_wins_over_port() {
        let config = Config::from_sources(
            ConfigFile::default(),
            env_from(&[("PORT", "1"), ("MARZELLE_PORT", "2")]),
        )
        .unwrap();
        assert_eq!(config.server.port, 2);
    }

    #[test]
    fn zero_window_is_rejected() {
        let result = Config::from_sources(ConfigFile::default(), env_from(&[("MARZELLE_WINDOW", "0")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn pinned_window_must_fit_system_and_newest_turn() {
        let result = Config::from_sources(ConfigFile::default(), env_from(&[("MARZELLE_WINDOW", "1")]));
        assert!(matches!(result, Err(Error::Config(_))));

        let fc: ConfigFile = toml::from_str("[chat]\nwindow_policy = \"sliding\"\nwindow = 1\n").unwrap();
        let config = Config::from_sources(fc, env_from(&[])).unwrap();
        assert_eq!(config.chat.window, 1);

        let config = Config::from_sources(ConfigFile::default(), env_from(&[("MARZELLE_WINDOW", "2")])).unwrap();
        assert_eq!(config.chat.window, 2);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = Config::from_sources(
            ConfigFile::default(),
            env_from(&[("MARZELLE_TIMEOUT_SECS", "0")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));

        let fc: ConfigFile = toml::from_str("[chat]\ntimeout_secs = 0\n").unwrap();
        assert!(matches!(Config::from_sources(fc, env_from(&[])), Err(Error::Config(_))));
    }

    #[test]
    fn bad_port_is_rejected() {
        let result = Config::from_sources(ConfigFile::default(), env_from(&[("PORT", "http")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn unknown_window_policy_is_rejected() {
        let fc: ConfigFile = toml::from_str("[chat]\nwindow_policy = \"fifo\"\n").unwrap();
        assert!(Config::from_sources(fc, env_from(&[])).is_err());
    }

    #[test]
    fn zero_rate_limit_disables_limiting() {
        let config = Config::from_sources(
            ConfigFile::default(),
            env_from(&[("MARZELLE_RATE_LIMIT_RPM", "0")]),
        )
        .unwrap();
        assert!(config.server.rate_limit_rpm.is_none());
    }
}
