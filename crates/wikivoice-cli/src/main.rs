//! wikivoice CLI — read encyclopedia articles hands-free from the terminal.
//!
//! ```text
//! wikivoice [--api-url http://127.0.0.1:35248] [--language it]
//!           [--speech kokoro|console] [--listen whisper|typed]
//! > search ancient rome
//! > voice
//! > open 2 / play / stop / next / prev / next-section / prev-section / home
//! ```

mod console;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use wikivoice_lib::wikivoice_core::locale::LocaleCatalog;
use wikivoice_lib::wikivoice_core::router::CommandRouter;
use wikivoice_lib::wikivoice_core::types::{
    ApiFlavor, NarrationState, SearchKind, SessionConfig, SessionStatus,
};
use wikivoice_lib::{
    ApiClient, ApiConfig, Collaborators, KokoroConfig, KokoroSpeech, NarrationOp, SpeechInput,
    SpeechOutput, VoiceSession, WhisperConfig, WhisperListener,
};

use crate::console::{ConsoleSpeech, TerminalCues, TerminalHighlighter, TypedInput};

/// wikivoice — voice-driven encyclopedia reader
#[derive(Parser)]
#[command(name = "wikivoice", version, about)]
struct Cli {
    /// Search/article server URL
    #[arg(long, default_value = "http://127.0.0.1:35248")]
    api_url: String,
    /// Endpoint naming of the server
    #[arg(long, default_value = "current")]
    api_flavor: ApiFlavor,
    /// Search kinds to query, in result order
    #[arg(long = "search-kind", default_values = ["title", "lexical"])]
    search_kinds: Vec<SearchKind>,
    /// Results per search kind
    #[arg(long, default_value = "10")]
    limit: u32,
    /// Language for speech and voice commands
    #[arg(long, default_value = "en")]
    language: String,
    /// Language used when --language has no command table
    #[arg(long, default_value = "en")]
    fallback_language: String,
    /// JSON command tables replacing the built-in ones
    #[arg(long)]
    commands: Option<PathBuf>,
    /// Speech output
    #[arg(long, value_enum, default_value = "kokoro")]
    speech: SpeechBackend,
    /// Speech input
    #[arg(long, value_enum, default_value = "whisper")]
    listen: ListenBackend,
    /// Kokoro TTS server URL
    #[arg(long, default_value = "http://localhost:3001")]
    kokoro_url: String,
    /// Kokoro voice, overriding the per-language choice
    #[arg(long)]
    voice: Option<String>,
    /// TTS playback speed
    #[arg(long, default_value = "1.0")]
    speed: f32,
    /// Whisper server URL
    #[arg(long, default_value = "http://localhost:2022")]
    whisper_url: String,
    /// Whisper model name
    #[arg(long, default_value = "base")]
    whisper_model: String,
    /// Upper bound on one listening session, in milliseconds. Defaults to
    /// the listener's own recognition window.
    #[arg(long)]
    listen_timeout_ms: Option<u64>,
    /// Pause after a title or section title, in milliseconds
    #[arg(long, default_value = "1500")]
    heading_pause_ms: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum SpeechBackend {
    Kokoro,
    /// Print utterances instead of speaking them
    Console,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListenBackend {
    Whisper,
    /// Read transcripts from the terminal
    Typed,
}

/// One line typed at the prompt.
#[derive(Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct Line {
    #[command(subcommand)]
    command: Input,
}

#[derive(Subcommand)]
enum Input {
    /// Search for articles
    Search {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        query: Vec<String>,
    },
    /// Open a result from the list (zero-based)
    Open { index: usize },
    /// Open an article by id
    Article { id: u64 },
    /// Press the microphone button
    Voice,
    Play,
    Stop,
    Repeat,
    Next,
    Prev,
    NextSection,
    PrevSection,
    /// Back to the search page
    Home,
    /// Print the session status as JSON
    Status,
    Quit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let catalog = load_catalog(cli.commands.as_ref())?;
    let api = ApiClient::new(ApiConfig {
        base_url: cli.api_url.clone(),
        flavor: cli.api_flavor,
        ..ApiConfig::default()
    })
    .context("failed to build backend client")?;

    let output: Arc<dyn SpeechOutput> = match cli.speech {
        SpeechBackend::Kokoro => {
            let mut config = KokoroConfig {
                url: cli.kokoro_url.clone(),
                speed: cli.speed,
                ..KokoroConfig::default()
            };
            if let Some(voice) = &cli.voice {
                config.voices.clear();
                config.default_voice = voice.clone();
            }
            Arc::new(KokoroSpeech::new(config).context("failed to start speech output")?)
        }
        SpeechBackend::Console => Arc::new(ConsoleSpeech::default()),
    };
    let typed = Arc::new(TypedInput::default());
    let input: Arc<dyn SpeechInput> = match cli.listen {
        ListenBackend::Whisper => Arc::new(WhisperListener::new(WhisperConfig {
            url: cli.whisper_url.clone(),
            model: cli.whisper_model.clone(),
            ..WhisperConfig::default()
        })),
        ListenBackend::Typed => typed.clone(),
    };

    let config = session_config(&cli, input.recognition_window());
    tracing::info!(
        language = %config.language,
        fallback = %config.fallback_language,
        listen_timeout_ms = config.listen_timeout_ms,
        api = %cli.api_url,
        "starting voice session"
    );

    let session = VoiceSession::spawn(
        config,
        CommandRouter::new(catalog),
        Collaborators {
            output,
            input,
            backend: Arc::new(api),
            cues: Arc::new(TerminalCues),
            highlighter: Arc::new(TerminalHighlighter),
        },
    )
    .context("invalid session configuration")?;
    tokio::spawn(report(session.subscribe_status()));

    println!("wikivoice ready. Type `help` for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() || typed.offer(&line) {
            continue;
        }
        let parsed = match Line::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => parsed.command,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match parsed {
            Input::Quit => break,
            Input::Status => {
                println!("{}", serde_json::to_string_pretty(&session.status())?);
            }
            other => dispatch(&session, other),
        }
    }
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wikivoice_lib=info,wikivoice=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn session_config(cli: &Cli, window: Option<Duration>) -> SessionConfig {
    let defaults = SessionConfig::default();
    let listen_timeout_ms = cli
        .listen_timeout_ms
        .or(window.map(|w| w.as_millis() as u64))
        .unwrap_or(defaults.listen_timeout_ms);
    SessionConfig {
        language: cli.language.clone(),
        fallback_language: cli.fallback_language.clone(),
        search_kinds: cli.search_kinds.clone(),
        search_limit: cli.limit,
        listen_timeout_ms,
        heading_pause_ms: cli.heading_pause_ms,
    }
}

fn load_catalog(path: Option<&PathBuf>) -> anyhow::Result<LocaleCatalog> {
    let catalog = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            LocaleCatalog::from_json(&json)
                .with_context(|| format!("invalid command tables in {}", path.display()))?
        }
        None => LocaleCatalog::builtin().context("built-in command tables are invalid")?,
    };
    Ok(catalog)
}

fn dispatch(session: &VoiceSession, input: Input) {
    match input {
        Input::Search { query } => session.search(query.join(" ")),
        Input::Open { index } => session.open_result(index),
        Input::Article { id } => session.open_article(id),
        Input::Voice => session.voice(),
        Input::Play => session.narration(NarrationOp::Play),
        Input::Stop => session.narration(NarrationOp::Stop),
        Input::Repeat => session.narration(NarrationOp::Repeat),
        Input::Next => session.narration(NarrationOp::NextText),
        Input::Prev => session.narration(NarrationOp::PreviousText),
        Input::NextSection => session.narration(NarrationOp::NextSection),
        Input::PrevSection => session.narration(NarrationOp::PreviousSection),
        Input::Home => session.home(),
        Input::Status | Input::Quit => {}
    }
}

/// Print what a page would show: mode changes, result lists, errors.
async fn report(mut status: watch::Receiver<SessionStatus>) {
    let mut shown = SessionStatus::default();
    while status.changed().await.is_ok() {
        let now = status.borrow_and_update().clone();
        if now.mode != shown.mode || now.article_title != shown.article_title {
            match &now.article_title {
                Some(title) => println!("── {title} ({:?})", now.mode),
                None => println!("── {:?}", now.mode),
            }
        }
        let playing = now.narration.is_some_and(NarrationState::is_playing);
        let was_playing = shown.narration.is_some_and(NarrationState::is_playing);
        if playing != was_playing {
            println!("{}", if playing { "▶ playing" } else { "⏸ stopped" });
        }
        if now.results != shown.results && !now.results.is_empty() {
            for (i, result) in now.results.iter().enumerate() {
                println!("  {i}. {} — {}", result.title, result.snippet);
            }
        }
        if now.last_error != shown.last_error {
            if let Some(error) = &now.last_error {
                eprintln!("error: {error}");
            }
        }
        shown = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Input {
        Line::try_parse_from(line.split_whitespace())
            .unwrap()
            .command
    }

    #[test]
    fn search_joins_words() {
        match parse("search ancient rome") {
            Input::Search { query } => assert_eq!(query.join(" "), "ancient rome"),
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn kebab_case_navigation() {
        assert!(matches!(parse("next-section"), Input::NextSection));
        assert!(matches!(parse("prev-section"), Input::PrevSection));
        assert!(matches!(parse("open 2"), Input::Open { index: 2 }));
    }

    #[test]
    fn bad_lines_are_errors() {
        assert!(Line::try_parse_from("open two".split_whitespace()).is_err());
        assert!(Line::try_parse_from("fly".split_whitespace()).is_err());
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["wikivoice"]).unwrap();
        assert_eq!(cli.api_url, "http://127.0.0.1:35248");
        assert_eq!(cli.search_kinds, vec![SearchKind::Title, SearchKind::Lexical]);
        assert_eq!(cli.api_flavor, ApiFlavor::Current);
    }

    #[test]
    fn builtin_catalog_loads() {
        assert!(load_catalog(None).is_ok());
        assert!(load_catalog(Some(&PathBuf::from("/nonexistent/commands.json"))).is_err());
    }

    #[test]
    fn listen_timeout_defaults_to_recognition_window() {
        let cli = Cli::try_parse_from(["wikivoice", "--fallback-language", "it"]).unwrap();
        let config = session_config(&cli, Some(Duration::from_secs(25)));
        assert_eq!(config.listen_timeout_ms, 25_000);
        assert_eq!(config.fallback_language, "it");

        let typed = session_config(&cli, None);
        assert_eq!(typed.listen_timeout_ms, SessionConfig::default().listen_timeout_ms);

        let cli = Cli::try_parse_from(["wikivoice", "--listen-timeout-ms", "30000"]).unwrap();
        assert_eq!(session_config(&cli, Some(Duration::from_secs(25))).listen_timeout_ms, 30_000);
    }
}
