//! Terminal stand-ins for the speaker, microphone, and page.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};

use wikivoice_lib::wikivoice_core::types::HighlightTarget;
use wikivoice_lib::{AudioCue, AudioCues, Highlighter, SpeechInput, SpeechOutput};

/// Prints utterances and holds them for roughly their reading time.
pub struct ConsoleSpeech {
    per_word: Duration,
    cancelled: Notify,
}

impl ConsoleSpeech {
    pub fn new(per_word: Duration) -> Self {
        Self {
            per_word,
            cancelled: Notify::new(),
        }
    }

    fn duration_of(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count().max(1) as u32;
        self.per_word * words
    }
}

impl Default for ConsoleSpeech {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[async_trait]
impl SpeechOutput for ConsoleSpeech {
    async fn speak(&self, text: &str, _locale: &str) {
        let cancelled = self.cancelled.notified();
        println!("🔊 {text}");
        tokio::select! {
            _ = tokio::time::sleep(self.duration_of(text)) => {}
            _ = cancelled => {}
        }
    }

    fn cancel(&self) {
        self.cancelled.notify_waiters();
    }
}

/// Speech input fed from typed lines.
#[derive(Default)]
pub struct TypedInput {
    waiting: Mutex<Option<oneshot::Sender<String>>>,
}

impl TypedInput {
    /// Hand `line` to a pending recognition session. Returns false when
    /// nothing is listening, so the line is a command instead.
    pub fn offer(&self, line: &str) -> bool {
        let waiting = self.waiting.lock().unwrap_or_else(|e| e.into_inner()).take();
        match waiting {
            Some(tx) => tx.send(line.trim().to_lowercase()).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl SpeechInput for TypedInput {
    async fn listen_once(&self, _locale: &str) -> String {
        let (tx, rx) = oneshot::channel();
        *self.waiting.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        println!("🎤 (type what you would say)");
        rx.await.unwrap_or_default()
    }

    fn cancel(&self) {
        self.waiting.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

pub struct TerminalCues;

impl AudioCues for TerminalCues {
    fn play(&self, cue: AudioCue) {
        match cue {
            AudioCue::Alert => print!("\x07"),
            AudioCue::LoadingStart => println!("… loading"),
            _ => tracing::trace!(?cue, "cue"),
        }
    }
}

pub struct TerminalHighlighter;

impl Highlighter for TerminalHighlighter {
    fn set_highlighted(&self, target: Option<HighlightTarget>) {
        match target {
            Some(HighlightTarget::Title) => println!("» title"),
            Some(HighlightTarget::SectionTitle { section }) => println!("» section {section}"),
            Some(HighlightTarget::Text { position }) => println!("» text {position}"),
            Some(HighlightTarget::Result { index }) => println!("» result {index}"),
            None => {}
        }
    }
}
