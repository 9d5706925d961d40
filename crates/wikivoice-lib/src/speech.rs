//! Speech and rendering collaborator contracts.
//!
//! The session only ever talks to these traits. Concrete engines live in
//! [`crate::kokoro`] and [`crate::whisper`]; tests substitute fakes.

use std::time::Duration;

use async_trait::async_trait;

use wikivoice_core::types::HighlightTarget;

/// Failures inside a speech engine. Never surfaced past the trait boundary:
/// output errors resolve as completion, input errors as an empty transcript.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("audio device: {0}")]
    Device(String),
    #[error("synthesis request failed: {0}")]
    Synthesis(String),
    #[error("transcription request failed: {0}")]
    Transcription(String),
    #[error("cancelled")]
    Cancelled,
}

/// Speech synthesis.
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Speak `text`; resolves exactly once when the utterance ends, fails,
    /// or is cancelled.
    async fn speak(&self, text: &str, locale: &str);

    /// Best-effort immediate stop. Safe to call with nothing active.
    fn cancel(&self);
}

/// Speech recognition.
#[async_trait]
pub trait SpeechInput: Send + Sync {
    /// Run one recognition session. Resolves with a lowercase transcript, or
    /// an empty string on no-match, error, early end, or cancellation.
    async fn listen_once(&self, locale: &str) -> String;

    /// Abort the running session, if any.
    fn cancel(&self);

    /// Longest a session can take before it resolves by itself, when the
    /// engine bounds it.
    fn recognition_window(&self) -> Option<Duration> {
        None
    }
}

/// Short non-speech UI sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCue {
    ListenStart,
    ListenStop,
    LoadingStart,
    LoadingStop,
    Alert,
}

pub trait AudioCues: Send + Sync {
    fn play(&self, cue: AudioCue);
}

/// Cue sink that makes no sound.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentCues;

impl AudioCues for SilentCues {
    fn play(&self, cue: AudioCue) {
        tracing::trace!(?cue, "audio cue");
    }
}

/// Rendering side of narration: marks exactly one element as current.
pub trait Highlighter: Send + Sync {
    /// `None` clears any highlight.
    fn set_highlighted(&self, target: Option<HighlightTarget>);
}

/// Highlighter for headless sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHighlight;

impl Highlighter for NoHighlight {
    fn set_highlighted(&self, _target: Option<HighlightTarget>) {}
}
