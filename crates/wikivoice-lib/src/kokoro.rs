//! Kokoro speech output — OpenAI-compatible `/v1/audio/speech`, streamed PCM.
//!
//! ```text
//! speak(text) → clean + split into chunks
//!     → per chunk: POST Kokoro, stream PCM into a PcmStream
//!     → Player thread: sequential playback, completion per chunk
//! ```
//!
//! Epoch-based cancellation: `cancel()` bumps an [`AtomicU64`] and flushes the
//! player, so every in-flight request and queued chunk for the previous epoch
//! is abandoned and the pending `speak` resolves.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use wikivoice_core::locale::primary_subtag;
use wikivoice_core::text_prep::{
    clean_text_for_speech, is_speakable, split_text, DEFAULT_MAX_CHUNK_LEN,
};

use crate::playback::{PcmDecoder, PcmFeed, PcmStream, Player};
use crate::speech::{SpeechError, SpeechOutput};

/// Kokoro PCM streaming format: 24 kHz mono 16-bit signed LE.
const PCM_SAMPLE_RATE: u32 = 24_000;
const PCM_CHANNELS: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KokoroConfig {
    pub url: String,
    /// Voice per primary language subtag.
    pub voices: BTreeMap<String, String>,
    pub default_voice: String,
    pub speed: f32,
    pub max_chunk_len: usize,
}

impl Default for KokoroConfig {
    fn default() -> Self {
        let voices = [("en", "af_heart"), ("it", "if_sara"), ("es", "ef_dora")]
            .into_iter()
            .map(|(lang, voice)| (lang.to_string(), voice.to_string()))
            .collect();
        Self {
            url: "http://localhost:3001".into(),
            voices,
            default_voice: "af_heart".into(),
            speed: 1.0,
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
        }
    }
}

impl KokoroConfig {
    pub fn voice_for(&self, locale: &str) -> &str {
        self.voices
            .get(locale)
            .or_else(|| self.voices.get(&primary_subtag(locale)))
            .map_or(self.default_voice.as_str(), String::as_str)
    }
}

pub struct KokoroSpeech {
    client: reqwest::Client,
    config: KokoroConfig,
    player: Player,
    epoch: Arc<AtomicU64>,
}

impl KokoroSpeech {
    pub fn new(config: KokoroConfig) -> Result<Self, SpeechError> {
        Ok(Self {
            client: reqwest::Client::new(),
            config,
            player: Player::spawn()?,
            epoch: Arc::new(AtomicU64::new(0)),
        })
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Synthesize and play one chunk, returning once it has been heard.
    async fn play_chunk(&self, text: &str, voice: &str, epoch: u64) -> Result<(), SpeechError> {
        let body = serde_json::json!({
            "input": text,
            "voice": voice,
            "model": "kokoro",
            "response_format": "pcm",
            "stream": true,
            "speed": self.config.speed,
        });
        let url = format!("{}/v1/audio/speech", self.config.url.trim_end_matches('/'));
        debug!("kokoro: POST {} chars", text.len());

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(SpeechError::Synthesis(format!("{status}: {detail}")));
        }

        let mut bytes = resp.bytes_stream();
        let mut decoder = PcmDecoder::default();
        let mut feed: Option<mpsc::Sender<PcmFeed>> = None;
        let mut finished = None;

        while let Some(chunk) = bytes.next().await {
            if !self.is_current(epoch) {
                return Err(SpeechError::Cancelled);
            }
            let chunk = chunk.map_err(|e| SpeechError::Synthesis(e.to_string()))?;
            let samples = decoder.decode(&chunk);
            if samples.is_empty() {
                continue;
            }
            match &feed {
                Some(tx) => {
                    if tx.send(PcmFeed::Samples(samples)).is_err() {
                        return Err(SpeechError::Cancelled);
                    }
                }
                None => {
                    let (tx, rx) = mpsc::channel();
                    let _ = tx.send(PcmFeed::Samples(samples));
                    let stream = PcmStream::new(rx, PCM_CHANNELS, PCM_SAMPLE_RATE);
                    finished = Some(self.player.play(stream));
                    feed = Some(tx);
                    // cancel() may have flushed the player just before this stream landed.
                    if !self.is_current(epoch) {
                        self.player.stop();
                        return Err(SpeechError::Cancelled);
                    }
                }
            }
        }

        if let Some(tx) = feed {
            let _ = tx.send(PcmFeed::End);
        }
        match finished {
            Some(done) => done.await.map_err(|_| SpeechError::Cancelled),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SpeechOutput for KokoroSpeech {
    async fn speak(&self, text: &str, locale: &str) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let cleaned = clean_text_for_speech(text);
        if !is_speakable(&cleaned) {
            return;
        }
        let voice = self.config.voice_for(locale).to_string();
        for chunk in split_text(&cleaned, self.config.max_chunk_len) {
            if !self.is_current(epoch) {
                return;
            }
            match self.play_chunk(&chunk, &voice, epoch).await {
                Ok(()) => {}
                Err(SpeechError::Cancelled) => return,
                Err(e) => {
                    warn!("kokoro: {e}");
                    return;
                }
            }
        }
    }

    fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.player.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_lookup_prefers_exact_then_primary_then_default() {
        let mut config = KokoroConfig::default();
        config.voices.insert("en-GB".into(), "bf_emma".into());
        assert_eq!(config.voice_for("en-GB"), "bf_emma");
        assert_eq!(config.voice_for("it-IT"), "if_sara");
        assert_eq!(config.voice_for("de"), "af_heart");
    }
}
