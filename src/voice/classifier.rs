//! Binary voice-activity classifiers
//!
//! A classifier looks at one frame of little-endian 16-bit PCM and answers
//! whether it carries speech. Errors are per-frame and never fatal.

use webrtc_vad::{SampleRate, Vad, VadMode};

use super::pcm;
use crate::config::ClassifierKind;
use crate::{Error, Result};

/// Decides whether a single frame contains voice
pub trait VoiceClassifier {
    /// Classify one frame of little-endian 16-bit PCM
    ///
    /// # Errors
    ///
    /// Returns `Error::Classification` if the frame is malformed for this
    /// classifier
    fn classify(&mut self, sample_rate: u32, frame: &[u8]) -> Result<bool>;
}

impl<C: VoiceClassifier + ?Sized> VoiceClassifier for Box<C> {
    fn classify(&mut self, sample_rate: u32, frame: &[u8]) -> Result<bool> {
        (**self).classify(sample_rate, frame)
    }
}

/// WebRTC VAD in its most aggressive mode
pub struct WebRtcClassifier {
    vad: Vad,
    sample_rate: u32,
}

impl WebRtcClassifier {
    /// Create a classifier for the given capture rate
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if WebRTC VAD does not support the rate
    pub fn new(sample_rate: u32) -> Result<Self> {
        let rate = match sample_rate {
            8000 => SampleRate::Rate8kHz,
            16000 => SampleRate::Rate16kHz,
            32000 => SampleRate::Rate32kHz,
            48000 => SampleRate::Rate48kHz,
            other => {
                return Err(Error::Config(format!(
                    "unsupported VAD sample rate: {other}"
                )));
            }
        };

        tracing::debug!(sample_rate, mode = "very-aggressive", "webrtc vad initialized");

        Ok(Self {
            vad: Vad::new_with_rate_and_mode(rate, VadMode::VeryAggressive),
            sample_rate,
        })
    }
}

impl VoiceClassifier for WebRtcClassifier {
    fn classify(&mut self, sample_rate: u32, frame: &[u8]) -> Result<bool> {
        if sample_rate != self.sample_rate {
            return Err(Error::Classification(format!(
                "classifier runs at {} Hz, frame is {sample_rate} Hz",
                self.sample_rate
            )));
        }

        let samples =
            pcm::bytes_to_pcm16(frame).map_err(|e| Error::Classification(e.to_string()))?;

        self.vad.is_voice_segment(&samples).map_err(|()| {
            Error::Classification(format!("invalid frame length {}", samples.len()))
        })
    }
}

/// RMS-threshold classifier for hosts without a usable WebRTC VAD
#[derive(Debug, Clone, Copy)]
pub struct EnergyClassifier {
    threshold: f32,
}

impl EnergyClassifier {
    /// Create a classifier that marks frames above `threshold` RMS as voice
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl VoiceClassifier for EnergyClassifier {
    fn classify(&mut self, _sample_rate: u32, frame: &[u8]) -> Result<bool> {
        if frame.is_empty() {
            return Err(Error::Classification("empty frame".to_string()));
        }

        let samples =
            pcm::bytes_to_normalized(frame).map_err(|e| Error::Classification(e.to_string()))?;
        let energy = pcm::rms(&samples);
        tracing::trace!(energy, threshold = self.threshold, "frame energy");

        Ok(energy > self.threshold)
    }
}

/// Build the classifier selected in configuration
///
/// # Errors
///
/// Returns error if the classifier cannot be initialized
pub fn build_classifier(
    kind: ClassifierKind,
    sample_rate: u32,
    energy_threshold: f32,
) -> Result<Box<dyn VoiceClassifier>> {
    match kind {
        ClassifierKind::WebRtc => Ok(Box::new(WebRtcClassifier::new(sample_rate)?)),
        ClassifierKind::Energy => Ok(Box::new(EnergyClassifier::new(energy_threshold))),
    }
}
