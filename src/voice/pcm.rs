//! PCM frames and sample conversions

use crate::{Error, Result};

/// Capture sample rate (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per captured frame (20ms at 16kHz)
pub const FRAME_SAMPLES: usize = 320;

/// Playback sample rate of the synthesis service
pub const PLAYBACK_SAMPLE_RATE: u32 = 8000;

/// Scale between 16-bit samples and normalized floats
const PCM_SCALE: f32 = 32768.0;

/// One fixed-size block of mono 16-bit samples
///
/// Immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    samples: Vec<i16>,
}

impl Frame {
    /// Wrap captured samples in a frame
    ///
    /// # Errors
    ///
    /// Returns `Error::Conversion` if `samples` is not exactly
    /// [`FRAME_SAMPLES`] long
    pub fn new(samples: Vec<i16>) -> Result<Self> {
        if samples.len() != FRAME_SAMPLES {
            return Err(Error::Conversion(format!(
                "frame must hold {FRAME_SAMPLES} samples, got {}",
                samples.len()
            )));
        }
        Ok(Self { samples })
    }

    /// Raw samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Little-endian byte view, as handed to the classifier
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        pcm16_to_bytes(&self.samples)
    }
}

/// Encode 16-bit samples as little-endian bytes
#[must_use]
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Decode little-endian 16-bit PCM bytes
///
/// # Errors
///
/// Returns `Error::Conversion` if the byte count is odd
pub fn bytes_to_pcm16(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Conversion(format!(
            "pcm data length must be even, got {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Decode little-endian 16-bit PCM bytes into normalized floats
///
/// # Errors
///
/// Returns `Error::Conversion` if the byte count is odd
pub fn bytes_to_normalized(bytes: &[u8]) -> Result<Vec<f32>> {
    Ok(bytes_to_pcm16(bytes)?
        .into_iter()
        .map(pcm16_to_f32)
        .collect())
}

/// Scale a 16-bit sample into [-1, 1)
#[must_use]
pub fn pcm16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / PCM_SCALE
}

/// Quantize a normalized float to a 16-bit sample
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_pcm16(sample: f32) -> i16 {
    (sample * PCM_SCALE).round().clamp(-PCM_SCALE, PCM_SCALE - 1.0) as i16
}

/// Encode floats as little-endian 32-bit bytes (transcription request body)
#[must_use]
pub fn f32_to_le_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// RMS energy of normalized samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
