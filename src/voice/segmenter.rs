//! Voice-activity segmentation
//!
//! Accumulates voiced frames and declares an utterance boundary once a run of
//! silent frames longer than the hangover follows speech.

use super::classifier::VoiceClassifier;
use super::pcm::{self, Frame};

/// Default number of silent frames tolerated inside an utterance (100ms)
pub const DEFAULT_HANGOVER_FRAMES: usize = 5;

/// Activity state of the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    /// No utterance pending, or the silence run has closed one
    Silence,
    /// Voice seen since the last boundary
    Voice,
}

/// One candidate sentence of normalized samples
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Utterance {
    /// Concatenate normalized frames into an utterance
    #[must_use]
    pub fn from_frames(frames: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            samples: frames.concat(),
            sample_rate,
        }
    }

    /// Flat sample sequence
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate of the samples
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Mutable segmentation state, owned by the capture loop
#[derive(Debug, Default)]
pub struct SegmenterState {
    /// Normalized voiced frames since the last boundary
    pub buffer: Vec<Vec<f32>>,
    /// Consecutive inactive frames
    pub consecutive_silence_frames: usize,
}

/// Splits a frame stream into utterances
pub struct Segmenter<C> {
    classifier: C,
    sample_rate: u32,
    hangover_frames: usize,
    state: SegmenterState,
}

impl<C: VoiceClassifier> Segmenter<C> {
    /// Create a segmenter with the given classifier and hangover
    pub fn new(classifier: C, sample_rate: u32, hangover_frames: usize) -> Self {
        tracing::debug!(sample_rate, hangover_frames, "segmenter initialized");

        Self {
            classifier,
            sample_rate,
            hangover_frames,
            state: SegmenterState::default(),
        }
    }

    /// Feed one frame; returns an utterance when a boundary is reached
    ///
    /// Frames that fail conversion or classification are skipped.
    pub fn process(&mut self, frame: &Frame) -> Option<Utterance> {
        let bytes = frame.to_le_bytes();

        let normalized = match pcm::bytes_to_normalized(&bytes) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(error = %e, "skipping frame");
                return None;
            }
        };

        let active = match self.classifier.classify(self.sample_rate, &bytes) {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!(error = %e, "skipping frame");
                return None;
            }
        };

        if active {
            self.state.buffer.push(normalized);
            self.state.consecutive_silence_frames = 0;
            return None;
        }

        self.state.consecutive_silence_frames += 1;

        if self.state.consecutive_silence_frames > self.hangover_frames
            && !self.state.buffer.is_empty()
        {
            let frames = std::mem::take(&mut self.state.buffer);
            self.state.consecutive_silence_frames = 0;

            let utterance = Utterance::from_frames(frames, self.sample_rate);
            tracing::debug!(
                samples = utterance.samples().len(),
                duration = utterance.duration_secs(),
                "utterance complete"
            );
            return Some(utterance);
        }

        None
    }

    /// Current activity state
    #[must_use]
    pub fn activity(&self) -> ActivityState {
        if self.state.buffer.is_empty() {
            ActivityState::Silence
        } else {
            ActivityState::Voice
        }
    }

    /// Read-only view of the segmentation state
    #[must_use]
    pub const fn state(&self) -> &SegmenterState {
        &self.state
    }
}
