//! wikivoice-lib — voice session engine: backend client, speech engines,
//! microphone capture, and the session coordinator.

pub mod api;
pub mod capture;
pub mod kokoro;
pub mod playback;
pub mod session;
pub mod speech;
pub mod whisper;

pub use api::{ApiClient, ApiConfig, ApiError, Backend};
pub use kokoro::{KokoroConfig, KokoroSpeech};
pub use session::{Collaborators, NarrationOp, SessionError, VoiceSession};
pub use speech::{
    AudioCue, AudioCues, Highlighter, NoHighlight, SilentCues, SpeechInput, SpeechOutput,
};
pub use whisper::{WhisperConfig, WhisperListener};

// Re-export wikivoice-core for convenience
pub use wikivoice_core;
