//! Pre-transcription filtering
//!
//! The utterance gate drops clicks and breaths too short to carry speech;
//! the phrase filter drops transcripts known to be artifacts of the
//! transcription model.

use std::collections::HashSet;

use super::segmenter::Utterance;

/// Default minimum utterance duration in seconds
pub const DEFAULT_MIN_UTTERANCE_SECS: f64 = 0.40;

/// Captioning artifacts emitted on near-silent input
pub const DEFAULT_EXCLUDED_PHRASES: &[&str] = &[
    "Продолжение следует...",
    "Субтитры сделал DimaTorzok",
    "Субтитры создавал DimaTorzok",
];

/// Rejects utterances shorter than a minimum duration
#[derive(Debug, Clone, Copy)]
pub struct UtteranceGate {
    min_duration_secs: f64,
}

impl UtteranceGate {
    /// Create a gate with the given minimum duration
    #[must_use]
    pub const fn new(min_duration_secs: f64) -> Self {
        Self { min_duration_secs }
    }

    /// Whether the utterance is long enough to transcribe
    #[must_use]
    pub fn accept(&self, utterance: &Utterance) -> bool {
        utterance.duration_secs() >= self.min_duration_secs
    }

    /// Configured minimum duration
    #[must_use]
    pub const fn min_duration_secs(&self) -> f64 {
        self.min_duration_secs
    }
}

impl Default for UtteranceGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_UTTERANCE_SECS)
    }
}

/// Exact-match filter for spurious transcripts
#[derive(Debug, Clone)]
pub struct PhraseFilter {
    excluded: HashSet<String>,
}

impl PhraseFilter {
    /// Create a filter from a list of excluded phrases
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: phrases.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the transcript must not reach the dialogue stage
    #[must_use]
    pub fn should_drop(&self, transcript: &str) -> bool {
        self.excluded.contains(transcript)
    }

    /// Number of excluded phrases
    #[must_use]
    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    /// Whether no phrases are excluded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }
}

impl Default for PhraseFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_PHRASES.iter().copied())
    }
}
