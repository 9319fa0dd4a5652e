use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use marzelle_gateway::api::ApiServerBuilder;
use marzelle_gateway::{
    ChatRelay, Config, ConversationLog, OpenAiProvider, SessionStore, TextToSpeech,
};

/// Marzelle - voice chat relay for a browser speech client
#[derive(Parser)]
#[command(name = "marzelle", version, about)]
struct Cli {
    /// Port to listen on (overrides config and environment)
    #[arg(long)]
    port: Option<u16>,

    /// Path to a TOML config file
    #[arg(short, long, env = "MARZELLE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one chat turn and print the reply
    Ask {
        /// What to say to Marzelle
        text: String,
    },
    /// Synthesize text to an MP3 file
    Tts {
        /// Text to speak
        text: String,
        /// Where to write the audio
        #[arg(short, long, default_value = "marzelle.mp3")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,marzelle_gateway=info",
        1 => "info,marzelle_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Some(Command::Ask { text }) => ask(&config, &text).await,
        Some(Command::Tts { text, output }) => tts(&config, &text, &output).await,
        None => serve(&config).await,
    }
}

/// Build the chat relay, if a completion key is configured
fn build_relay(config: &Config) -> anyhow::Result<Option<ChatRelay>> {
    let Some(key) = config.api_keys.openai.clone() else {
        return Ok(None);
    };
    let provider = OpenAiProvider::new(key, &config.chat.base_url, config.retry_policy())?;
    Ok(Some(ChatRelay::new(Arc::new(provider), config.relay_settings())))
}

/// Build the TTS backend, if a key and voice are configured
fn build_tts(config: &Config) -> anyhow::Result<Option<TextToSpeech>> {
    let (Some(key), Some(settings)) = (config.api_keys.elevenlabs.clone(), config.tts_settings())
    else {
        return Ok(None);
    };
    Ok(Some(TextToSpeech::new(key, settings)?))
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        port = config.server.port,
        model = %config.chat.model,
        window = config.chat.window,
        policy = ?config.chat.window_policy,
        "starting marzelle gateway"
    );

    let relay = build_relay(config)?;
    if relay.is_none() {
        tracing::warn!("OPENAI_KEY not set - transcripts will not be answered");
    }
    let tts = build_tts(config)?;
    if tts.is_none() {
        tracing::warn!("ELEVEN_KEY or ELEVEN_VOICE_ID not set - TTS disabled");
    }
    if config.api_keys.deepgram.is_none() {
        tracing::warn!("DEEPGRAM_API_KEY not set - /key will return 503");
    }

    let sessions = Arc::new(SessionStore::new(
        config.chat.system_prompt.clone(),
        config.chat.window_policy,
    ));

    let mut builder = ApiServerBuilder::new(sessions, config.server.port)
        .stt_key(config.api_keys.deepgram.clone())
        .static_dir(config.server.static_dir.clone())
        .rate_limit_rpm(config.server.rate_limit_rpm);
    if let Some(relay) = relay {
        builder = builder.relay(relay);
    }
    if let Some(tts) = tts {
        builder = builder.tts(tts);
    }

    builder.build().run().await?;
    Ok(())
}

async fn ask(config: &Config, text: &str) -> anyhow::Result<()> {
    let relay = build_relay(config)?.context("OPENAI_KEY is required for `ask`")?;

    let mut log = ConversationLog::new(config.chat.system_prompt.clone(), config.chat.window_policy);
    let outcome = relay.ask(&mut log, text).await;
    let reply = relay.reply_or_fallback(outcome)?;

    println!("{reply}");
    Ok(())
}

async fn tts(config: &Config, text: &str, output: &Path) -> anyhow::Result<()> {
    let tts = build_tts(config)?.context("ELEVEN_KEY and ELEVEN_VOICE_ID are required for `tts`")?;

    let audio = tts.synthesize(text).await?;
    tokio::fs::write(output, &audio)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("Wrote {} bytes to {}", audio.len(), output.display());
    Ok(())
}
