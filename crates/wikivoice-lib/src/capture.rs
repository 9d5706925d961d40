//! Microphone capture using cpal.
//!
//! Delivers 16 kHz mono i16 chunks regardless of the device's native format,
//! rate, or channel count.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample};
use tokio::sync::mpsc;
use tracing::{error, warn};

use wikivoice_core::wav::SAMPLE_RATE;

use crate::speech::SpeechError;

/// Samples returned by [`AudioCapture::read_chunk`]: 100 ms at 16 kHz.
pub const CHUNK_SAMPLES: usize = 1_600;

/// Conversion from a device sample to 16-bit PCM.
trait ToPcm16: SizedSample + Send + 'static {
    fn to_pcm16(self) -> i16;
}

impl ToPcm16 for i16 {
    fn to_pcm16(self) -> i16 {
        self
    }
}

impl ToPcm16 for f32 {
    fn to_pcm16(self) -> i16 {
        (self.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
    }
}

pub struct AudioCapture {
    rx: mpsc::UnboundedReceiver<Vec<i16>>,
    pending: Vec<i16>,
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl AudioCapture {
    /// Open the default input device and start capturing.
    pub fn open() -> Result<Self, SpeechError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| SpeechError::Device("no microphone found".into()))?;
        let supported = device
            .default_input_config()
            .map_err(|e| SpeechError::Device(format!("input config: {e}")))?;

        let format = Format {
            rate: supported.sample_rate().0,
            channels: supported.channels(),
        };
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        // cpal streams are !Send on some hosts; keep this one on its own thread.
        let thread = std::thread::Builder::new()
            .name("wikivoice-capture".into())
            .spawn(move || {
                let stream = match sample_format {
                    SampleFormat::I16 => {
                        build_stream::<i16>(&device, &config, format, tx, thread_stop.clone())
                    }
                    SampleFormat::F32 => {
                        build_stream::<f32>(&device, &config, format, tx, thread_stop.clone())
                    }
                    other => {
                        error!("capture: unsupported sample format {other:?}");
                        return;
                    }
                };
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("capture: failed to build stream: {e}");
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    error!("capture: failed to start stream: {e}");
                    return;
                }
                while !thread_stop.load(Ordering::Relaxed) {
                    std::thread::park();
                }
            })
            .map_err(|e| SpeechError::Device(format!("failed to spawn capture thread: {e}")))?;

        Ok(Self {
            rx,
            pending: Vec::new(),
            stop,
            thread: Some(thread),
        })
    }

    /// Next [`CHUNK_SAMPLES`] samples. Errors once the device stream ends.
    pub async fn read_chunk(&mut self) -> Result<Vec<i16>, SpeechError> {
        while self.pending.len() < CHUNK_SAMPLES {
            let samples = self
                .rx
                .recv()
                .await
                .ok_or_else(|| SpeechError::Device("capture stream ended".into()))?;
            self.pending.extend_from_slice(&samples);
        }
        Ok(self.pending.drain(..CHUNK_SAMPLES).collect())
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Format {
    rate: u32,
    channels: u16,
}

fn build_stream<T: ToPcm16>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: Format,
    tx: mpsc::UnboundedSender<Vec<i16>>,
    stop: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            let pcm: Vec<i16> = data.iter().map(|&s| s.to_pcm16()).collect();
            let mono = downmix(&pcm, format.channels);
            let _ = tx.send(resample(&mono, format.rate, SAMPLE_RATE));
        },
        |err| warn!("capture: stream error: {err}"),
        None,
    )
}

/// Average interleaved frames down to one channel.
fn downmix(input: &[i16], channels: u16) -> Vec<i16> {
    let width = usize::from(channels.max(1));
    if width == 1 {
        return input.to_vec();
    }
    input
        .chunks_exact(width)
        .map(|frame| {
            let sum: i32 = frame.iter().copied().map(i32::from).sum();
            (sum / i32::from(channels)) as i16
        })
        .collect()
}

/// Linear-interpolation resampler; adequate for speech.
fn resample(input: &[i16], from: u32, to: u32) -> Vec<i16> {
    if from == to || input.is_empty() {
        return input.to_vec();
    }
    let step = f64::from(from) / f64::from(to);
    let len = (input.len() as f64 / step) as usize;
    (0..len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = pos - idx as f64;
            let a = f64::from(input[idx]);
            let b = input.get(idx + 1).copied().map_or(a, f64::from);
            (a + frac * (b - a)) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_mono_passthrough() {
        assert_eq!(downmix(&[5, -5, 9], 1), vec![5, -5, 9]);
    }

    #[test]
    fn downmix_stereo_averages_frames() {
        assert_eq!(downmix(&[100, 200, -300, -100], 2), vec![150, -200]);
    }

    #[test]
    fn resample_same_rate_is_identity() {
        assert_eq!(resample(&[1, 2, 3], SAMPLE_RATE, SAMPLE_RATE), vec![1, 2, 3]);
    }

    #[test]
    fn resample_48k_to_16k_takes_every_third() {
        let input: Vec<i16> = (0..12).collect();
        assert_eq!(resample(&input, 48_000, SAMPLE_RATE), vec![0, 3, 6, 9]);
    }

    #[test]
    fn resample_empty() {
        assert!(resample(&[], 44_100, SAMPLE_RATE).is_empty());
    }

    #[test]
    fn float_samples_clamp() {
        assert_eq!(2.0f32.to_pcm16(), i16::MAX);
        assert_eq!(0.0f32.to_pcm16(), 0);
    }
}
