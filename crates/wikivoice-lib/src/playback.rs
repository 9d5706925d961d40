//! Audio output: a channel-fed PCM source and the rodio playback thread.
//!
//! The synthesizer creates a [`PcmStream`] once the first samples arrive, so
//! the sink never starts on an empty source. Each queued stream carries a
//! completion sender that fires when the sink drains; `stop` drops those
//! senders instead, which callers observe as cancellation.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use rodio::{OutputStream, Sink, Source};
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::speech::SpeechError;

/// How long the sink polls for fresh PCM before padding with silence.
const FEED_WAIT: Duration = Duration::from_millis(10);

/// How often the playback thread checks whether the sink drained.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Message from the synthesizer to a playing [`PcmStream`].
pub enum PcmFeed {
    Samples(Vec<i16>),
    End,
}

/// rodio `Source` yielding samples as they arrive on a channel.
pub struct PcmStream {
    rx: Receiver<PcmFeed>,
    queued: VecDeque<i16>,
    channels: u16,
    sample_rate: u32,
    ended: bool,
}

impl PcmStream {
    pub fn new(rx: Receiver<PcmFeed>, channels: u16, sample_rate: u32) -> Self {
        Self {
            rx,
            queued: VecDeque::with_capacity(8192),
            channels,
            sample_rate,
            ended: false,
        }
    }

    fn accept(&mut self, feed: PcmFeed) {
        match feed {
            PcmFeed::Samples(samples) => self.queued.extend(samples),
            PcmFeed::End => self.ended = true,
        }
    }

    fn refill(&mut self) {
        while !self.ended {
            match self.rx.try_recv() {
                Ok(feed) => self.accept(feed),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => self.ended = true,
            }
        }
        if self.queued.is_empty() && !self.ended {
            match self.rx.recv_timeout(FEED_WAIT) {
                Ok(feed) => self.accept(feed),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => self.ended = true,
            }
        }
    }
}

impl Iterator for PcmStream {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.queued.is_empty() && !self.ended {
            self.refill();
        }
        match self.queued.pop_front() {
            Some(sample) => Some(sample),
            None if self.ended => None,
            // Underrun: pad with silence so the sink keeps the source.
            None => Some(0),
        }
    }
}

impl Source for PcmStream {
    fn current_frame_len(&self) -> Option<usize> {
        match (self.queued.len(), self.ended) {
            (0, true) => Some(0),
            (0, false) => Some(1),
            (n, _) => Some(n),
        }
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Little-endian 16-bit PCM decoder that carries odd trailing bytes across
/// network chunks.
#[derive(Debug, Default)]
pub struct PcmDecoder {
    carry: Option<u8>,
}

impl PcmDecoder {
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<i16> {
        let mut samples = Vec::with_capacity((bytes.len() + 1) / 2);
        let mut rest = bytes;
        if let Some(low) = self.carry.take() {
            match rest.split_first() {
                Some((&high, tail)) => {
                    samples.push(i16::from_le_bytes([low, high]));
                    rest = tail;
                }
                None => {
                    self.carry = Some(low);
                    return samples;
                }
            }
        }
        let mut pairs = rest.chunks_exact(2);
        samples.extend(pairs.by_ref().map(|p| i16::from_le_bytes([p[0], p[1]])));
        self.carry = pairs.remainder().first().copied();
        samples
    }
}

// ─── Playback thread ───────────────────────────────────────────────────────

enum PlayCmd {
    Play {
        source: PcmStream,
        done: oneshot::Sender<()>,
    },
    Stop,
}

/// Handle to the playback OS thread (rodio's `OutputStream` is `!Send`).
#[derive(Clone)]
pub struct Player {
    tx: Sender<PlayCmd>,
}

impl Player {
    pub fn spawn() -> Result<Self, SpeechError> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("wikivoice-playback".into())
            .spawn(move || playback_thread(rx))
            .map_err(|e| SpeechError::Device(format!("failed to spawn playback thread: {e}")))?;
        Ok(Self { tx })
    }

    /// Queue a stream. The receiver resolves `Ok` once it has been played
    /// out, or `Err` if playback was stopped first.
    pub fn play(&self, source: PcmStream) -> oneshot::Receiver<()> {
        let (done, rx) = oneshot::channel();
        // A dead thread drops `done`, which the caller sees as cancellation.
        let _ = self.tx.send(PlayCmd::Play { source, done });
        rx
    }

    /// Flush everything queued or playing.
    pub fn stop(&self) {
        let _ = self.tx.send(PlayCmd::Stop);
    }
}

fn playback_thread(rx: Receiver<PlayCmd>) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            error!("playback: failed to open audio output: {e}");
            return complete_without_device(rx);
        }
    };
    let mut sink = match Sink::try_new(&handle) {
        Ok(sink) => sink,
        Err(e) => {
            error!("playback: failed to create sink: {e}");
            return complete_without_device(rx);
        }
    };

    let mut waiting: Vec<oneshot::Sender<()>> = Vec::new();
    loop {
        match rx.recv_timeout(DRAIN_POLL) {
            Ok(PlayCmd::Play { source, done }) => {
                debug!("playback: stream appended");
                sink.append(source);
                waiting.push(done);
            }
            Ok(PlayCmd::Stop) => {
                sink.stop();
                waiting.clear();
                sink = match Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        error!("playback: failed to recreate sink: {e}");
                        return complete_without_device(rx);
                    }
                };
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                sink.stop();
                break;
            }
        }
        if sink.empty() {
            for done in waiting.drain(..) {
                let _ = done.send(());
            }
        }
    }
}

/// Without an output device every stream completes at once, so narration
/// keeps advancing instead of stalling.
fn complete_without_device(rx: Receiver<PlayCmd>) {
    while let Ok(cmd) = rx.recv() {
        if let PlayCmd::Play { done, .. } = cmd {
            let _ = done.send(());
        }
    }
}
