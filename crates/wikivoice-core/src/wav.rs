//! WAV encoding and audio level math for the recognition path.
//!
//! Pure functions — no I/O, no async runtime.

/// Sample rate of captured microphone audio (16 kHz mono).
pub const SAMPLE_RATE: u32 = 16_000;

const BITS_PER_SAMPLE: u16 = 16;
const HEADER_LEN: usize = 44;

/// RMS level of 16-bit PCM samples, normalized to 0.0–1.0.
pub fn compute_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f64 = samples
        .iter()
        .map(|&s| f64::from(s) / 32768.0)
        .map(|v| v * v)
        .sum();
    (energy / samples.len() as f64).sqrt() as f32
}

/// Milliseconds of audio represented by `samples` at `sample_rate`.
pub fn duration_ms(samples: usize, sample_rate: u32) -> u64 {
    (samples as u64 * 1000) / u64::from(sample_rate.max(1))
}

/// Encode mono 16-bit PCM as a complete WAV file for upload.
pub fn write_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let block_align = BITS_PER_SAMPLE / 8;
    let data_len = (samples.len() * usize::from(block_align)) as u32;
    let mut wav = Vec::with_capacity(HEADER_LEN + data_len as usize);

    let chunks: [(&[u8; 4], Vec<u8>); 2] = [
        (
            b"fmt ",
            [
                1u16.to_le_bytes().as_slice(), // PCM
                1u16.to_le_bytes().as_slice(), // mono
                sample_rate.to_le_bytes().as_slice(),
                (sample_rate * u32::from(block_align)).to_le_bytes().as_slice(),
                block_align.to_le_bytes().as_slice(),
                BITS_PER_SAMPLE.to_le_bytes().as_slice(),
            ]
            .concat(),
        ),
        (
            b"data",
            samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
        ),
    ];

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    for (id, body) in &chunks {
        wav.extend_from_slice(*id);
        wav.extend_from_slice(&(body.len() as u32).to_le_bytes());
        wav.extend_from_slice(body);
    }
    wav
}
