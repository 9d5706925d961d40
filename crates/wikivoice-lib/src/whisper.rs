//! Whisper speech input — microphone capture, energy VAD, and transcription
//! through a local Whisper server's `/v1/audio/transcriptions`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use wikivoice_core::locale::primary_subtag;
use wikivoice_core::wav::{compute_rms, duration_ms, write_wav, SAMPLE_RATE};

use crate::capture::AudioCapture;
use crate::speech::{SpeechError, SpeechInput};

/// Longest wait for one capture chunk before giving up on the device.
const CHUNK_READ_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    pub url: String,
    pub model: String,
    /// RMS level (0.0–1.0) above which a chunk counts as speech.
    pub silence_threshold: f32,
    /// Speech shorter than this never ends the capture.
    pub min_speech_ms: u64,
    /// Trailing silence that ends an utterance.
    pub silence_duration_ms: u64,
    pub max_capture_ms: u64,
    /// Give up when nobody starts talking within this window.
    pub no_speech_timeout_ms: u64,
    /// Upper bound on one transcription request.
    pub transcribe_timeout_ms: u64,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:2022".into(),
            model: "base".into(),
            silence_threshold: 0.004,
            min_speech_ms: 180,
            silence_duration_ms: 700,
            max_capture_ms: 12_000,
            no_speech_timeout_ms: 7_000,
            transcribe_timeout_ms: 8_000,
        }
    }
}

impl WhisperConfig {
    /// Worst case for one `listen_once`: a full capture, then transcription.
    pub fn recognition_window(&self) -> Duration {
        Duration::from_millis(self.max_capture_ms.max(self.no_speech_timeout_ms))
            + Duration::from_millis(self.transcribe_timeout_ms)
    }
}

// ─── Endpointing ───────────────────────────────────────────────────────────

/// What to do with one captured chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vad {
    /// Not speech yet; drop it.
    Skip,
    /// Keep it and read on.
    Keep,
    /// Keep it; the utterance is complete.
    Done,
    /// Nobody spoke before the no-speech window closed.
    NoSpeech,
}

/// Energy-based endpointer over a stream of chunk levels.
#[derive(Debug, Clone)]
pub struct Endpointer {
    threshold: f32,
    min_speech_ms: u64,
    silence_duration_ms: u64,
    max_capture_ms: u64,
    no_speech_timeout_ms: u64,
    speech_since: Option<u64>,
    silence_since: Option<u64>,
}

impl Endpointer {
    pub fn new(config: &WhisperConfig) -> Self {
        Self {
            threshold: config.silence_threshold,
            min_speech_ms: config.min_speech_ms,
            silence_duration_ms: config.silence_duration_ms,
            max_capture_ms: config.max_capture_ms,
            no_speech_timeout_ms: config.no_speech_timeout_ms,
            speech_since: None,
            silence_since: None,
        }
    }

    /// Classify a chunk with level `rms` observed `now_ms` after capture began.
    pub fn feed(&mut self, rms: f32, now_ms: u64) -> Vad {
        let Some(started) = self.speech_since else {
            if rms > self.threshold {
                self.speech_since = Some(now_ms);
                return Vad::Keep;
            }
            return if now_ms >= self.no_speech_timeout_ms {
                Vad::NoSpeech
            } else {
                Vad::Skip
            };
        };

        if now_ms >= self.max_capture_ms {
            return Vad::Done;
        }
        if rms > self.threshold {
            self.silence_since = None;
            return Vad::Keep;
        }
        if now_ms.saturating_sub(started) < self.min_speech_ms {
            return Vad::Keep;
        }
        let quiet_from = *self.silence_since.get_or_insert(now_ms);
        if now_ms.saturating_sub(quiet_from) >= self.silence_duration_ms {
            Vad::Done
        } else {
            Vad::Keep
        }
    }
}

// ─── Listener ──────────────────────────────────────────────────────────────

pub struct WhisperListener {
    client: reqwest::Client,
    config: WhisperConfig,
    active: Mutex<Option<Arc<AtomicBool>>>,
}

impl WhisperListener {
    pub fn new(config: WhisperConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            active: Mutex::new(None),
        }
    }

    fn begin(&self) -> Arc<AtomicBool> {
        let token = Arc::new(AtomicBool::new(false));
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = active.replace(token.clone()) {
            previous.store(true, Ordering::Relaxed);
        }
        token
    }

    /// Capture until the endpointer says the utterance is over.
    async fn capture(&self, cancel: &AtomicBool) -> Result<Vec<i16>, SpeechError> {
        let mut mic = AudioCapture::open()?;
        let mut endpointer = Endpointer::new(&self.config);
        let mut audio = Vec::new();
        let start = Instant::now();

        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(SpeechError::Cancelled);
            }
            let chunk = match tokio::time::timeout(CHUNK_READ_TIMEOUT, mic.read_chunk()).await {
                Ok(Ok(chunk)) => chunk,
                Ok(Err(e)) if audio.is_empty() => return Err(e),
                Ok(Err(_)) => break,
                Err(_) => return Err(SpeechError::Device("capture read timed out".into())),
            };
            let elapsed = start.elapsed().as_millis() as u64;
            match endpointer.feed(compute_rms(&chunk), elapsed) {
                Vad::Skip => {}
                Vad::Keep => audio.extend_from_slice(&chunk),
                Vad::Done => {
                    audio.extend_from_slice(&chunk);
                    break;
                }
                Vad::NoSpeech => return Ok(Vec::new()),
            }
        }
        Ok(audio)
    }

    async fn transcribe(&self, audio: &[i16], locale: &str) -> Result<String, SpeechError> {
        let part = reqwest::multipart::Part::bytes(write_wav(audio, SAMPLE_RATE))
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| SpeechError::Transcription(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("language", primary_subtag(locale))
            .text("response_format", "json");

        let url = format!(
            "{}/v1/audio/transcriptions",
            self.config.url.trim_end_matches('/')
        );
        let resp = self
            .client
            .post(&url)
            .timeout(Duration::from_millis(self.config.transcribe_timeout_ms))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SpeechError::Transcription(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SpeechError::Transcription(format!("{status}: {body}")));
        }
        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SpeechError::Transcription(e.to_string()))?;
        let text = value.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(normalize_transcript(text))
    }

    async fn listen(&self, locale: &str, cancel: &AtomicBool) -> Result<String, SpeechError> {
        let audio = self.capture(cancel).await?;
        if audio.is_empty() {
            return Ok(String::new());
        }
        debug!(
            ms = duration_ms(audio.len(), SAMPLE_RATE),
            "whisper: transcribing utterance"
        );
        let text = self.transcribe(&audio, locale).await?;
        if cancel.load(Ordering::Relaxed) {
            return Err(SpeechError::Cancelled);
        }
        Ok(text)
    }
}

/// Lowercase, drop Whisper's blank marker and punctuation so the transcript
/// can be matched against command phrases.
pub fn normalize_transcript(raw: &str) -> String {
    let text = raw.replace("[BLANK_AUDIO]", "").to_lowercase();
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| c.is_ascii_punctuation() && c != '\''))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl SpeechInput for WhisperListener {
    async fn listen_once(&self, locale: &str) -> String {
        let token = self.begin();
        let result = self.listen(locale, &token).await;
        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if active.as_ref().is_some_and(|t| Arc::ptr_eq(t, &token)) {
                *active = None;
            }
        }
        match result {
            Ok(text) => {
                debug!(%text, "whisper: heard");
                text
            }
            Err(SpeechError::Cancelled) => String::new(),
            Err(e) => {
                warn!("whisper: {e}");
                String::new()
            }
        }
    }

    fn cancel(&self) {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = active.as_ref() {
            token.store(true, Ordering::Relaxed);
        }
    }

    fn recognition_window(&self) -> Option<Duration> {
        Some(self.config.recognition_window())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpointer() -> Endpointer {
        Endpointer::new(&WhisperConfig::default())
    }

    #[test]
    fn recognition_window_covers_capture_and_transcription() {
        let config = WhisperConfig::default();
        assert_eq!(config.recognition_window(), Duration::from_secs(20));
        let listener = WhisperListener::new(config);
        assert_eq!(listener.recognition_window(), Some(Duration::from_secs(20)));
        // The default session bound leaves room for a full utterance.
        assert!(
            wikivoice_core::types::SessionConfig::default().listen_timeout()
                >= listener.recognition_window().unwrap()
        );
    }

    #[test]
    fn silence_is_skipped_until_no_speech_timeout() {
        let mut ep = endpointer();
        assert_eq!(ep.feed(0.0, 100), Vad::Skip);
        assert_eq!(ep.feed(0.0, 6_900), Vad::Skip);
        assert_eq!(ep.feed(0.0, 7_000), Vad::NoSpeech);
    }

    #[test]
    fn utterance_ends_after_trailing_silence() {
        let mut ep = endpointer();
        assert_eq!(ep.feed(0.1, 0), Vad::Keep);
        assert_eq!(ep.feed(0.1, 200), Vad::Keep);
        assert_eq!(ep.feed(0.0, 300), Vad::Keep);
        assert_eq!(ep.feed(0.0, 900), Vad::Keep);
        assert_eq!(ep.feed(0.0, 1_000), Vad::Done);
    }

    #[test]
    fn speech_resets_silence_window() {
        let mut ep = endpointer();
        ep.feed(0.1, 0);
        assert_eq!(ep.feed(0.0, 300), Vad::Keep);
        assert_eq!(ep.feed(0.1, 800), Vad::Keep);
        assert_eq!(ep.feed(0.0, 900), Vad::Keep);
        assert_eq!(ep.feed(0.0, 1_500), Vad::Keep);
        assert_eq!(ep.feed(0.0, 1_600), Vad::Done);
    }

    #[test]
    fn short_blip_does_not_end_capture() {
        let mut ep = endpointer();
        ep.feed(0.1, 0);
        assert_eq!(ep.feed(0.0, 100), Vad::Keep);
        assert_eq!(ep.feed(0.0, 150), Vad::Keep);
    }

    #[test]
    fn long_speech_is_capped() {
        let mut ep = endpointer();
        ep.feed(0.1, 0);
        assert_eq!(ep.feed(0.1, 12_000), Vad::Done);
    }

    #[test]
    fn transcripts_are_normalized() {
        assert_eq!(normalize_transcript(" Sì, leggilo. "), "sì leggilo");
        assert_eq!(normalize_transcript("Next section."), "next section");
        assert_eq!(normalize_transcript("[BLANK_AUDIO]"), "");
        assert_eq!(normalize_transcript("Next!"), "next");
    }
}
