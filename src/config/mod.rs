//! Configuration management for voicelink

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::voice::{DEFAULT_EXCLUDED_PHRASES, DEFAULT_HANGOVER_FRAMES, DEFAULT_MIN_UTTERANCE_SECS};
use crate::{Error, Result};

/// Default transcription endpoint
pub const DEFAULT_TRANSCRIPTION_URL: &str = "http://localhost:8002/complete_transcribe_r";

/// Default model server
pub const DEFAULT_DIALOGUE_URL: &str = "http://localhost:11434";

/// Default reply model
pub const DEFAULT_MODEL: &str = "gemma2:9b";

/// Default synthesis endpoint
pub const DEFAULT_SYNTHESIS_URL: &str = "ws://localhost:8001/ws";

/// Voice classifier backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    /// WebRTC VAD, very aggressive mode
    #[default]
    WebRtc,
    /// RMS energy threshold
    Energy,
}

/// voicelink configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Segmentation configuration
    pub segmenter: SegmenterConfig,

    /// Transcription service configuration
    pub transcription: TranscriptionConfig,

    /// Reply generation configuration
    pub dialogue: DialogueConfig,

    /// Speech synthesis configuration
    pub synthesis: SynthesisConfig,

    /// Transcripts dropped before reply generation
    pub excluded_phrases: Vec<String>,

    /// Delay between interrupt and process exit
    pub shutdown_grace: Duration,

    /// Directory receiving a WAV of every gated utterance
    pub utterance_dir: Option<PathBuf>,
}

/// Voice-activity segmentation configuration
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Silent frames tolerated before an utterance closes
    pub hangover_frames: usize,

    /// Minimum utterance duration in seconds
    pub min_utterance_secs: f64,

    /// Classifier backend
    pub classifier: ClassifierKind,

    /// RMS threshold for the energy classifier
    pub energy_threshold: f32,
}

/// Transcription service configuration
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    /// Endpoint receiving raw f32 PCM
    pub url: String,

    /// Request timeout
    pub timeout: Duration,
}

/// Reply generation configuration
#[derive(Debug, Clone)]
pub struct DialogueConfig {
    /// Base URL of the model server
    pub url: String,

    /// Model identifier
    pub model: String,

    /// Request timeout
    pub timeout: Duration,

    /// Abandon the utterance when reply generation fails
    pub abort_on_error: bool,
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// WebSocket endpoint
    pub url: String,

    /// Language code
    pub language: String,

    /// Speed multiplier
    pub speed: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig {
                hangover_frames: DEFAULT_HANGOVER_FRAMES,
                min_utterance_secs: DEFAULT_MIN_UTTERANCE_SECS,
                classifier: ClassifierKind::default(),
                energy_threshold: 0.03,
            },
            transcription: TranscriptionConfig {
                url: DEFAULT_TRANSCRIPTION_URL.to_string(),
                timeout: Duration::from_secs(60),
            },
            dialogue: DialogueConfig {
                url: DEFAULT_DIALOGUE_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
                timeout: Duration::from_secs(120),
                abort_on_error: false,
            },
            synthesis: SynthesisConfig {
                url: DEFAULT_SYNTHESIS_URL.to_string(),
                language: "ru".to_string(),
                speed: 1.0,
            },
            excluded_phrases: DEFAULT_EXCLUDED_PHRASES
                .iter()
                .map(ToString::to_string)
                .collect(),
            shutdown_grace: Duration::from_secs(1),
            utterance_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if the config file is invalid or a value is out of range
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path)?;
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with environment lookups (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if an override does not parse or a value is out of range
    pub fn from_sources<F>(fc: file::VoicelinkConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let segmenter = SegmenterConfig {
            hangover_frames: fc
                .segmenter
                .hangover_frames
                .unwrap_or(defaults.segmenter.hangover_frames),
            min_utterance_secs: fc
                .segmenter
                .min_utterance_secs
                .unwrap_or(defaults.segmenter.min_utterance_secs),
            classifier: fc
                .segmenter
                .classifier
                .unwrap_or(defaults.segmenter.classifier),
            energy_threshold: fc
                .segmenter
                .energy_threshold
                .unwrap_or(defaults.segmenter.energy_threshold),
        };

        let transcription = TranscriptionConfig {
            url: env("VOICELINK_TRANSCRIPTION_URL")
                .or(fc.transcription.url)
                .unwrap_or(defaults.transcription.url),
            timeout: fc
                .transcription
                .timeout_secs
                .map_or(defaults.transcription.timeout, Duration::from_secs),
        };

        let dialogue = DialogueConfig {
            url: env("VOICELINK_DIALOGUE_URL")
                .or(fc.dialogue.url)
                .unwrap_or(defaults.dialogue.url),
            model: env("VOICELINK_MODEL")
                .or(fc.dialogue.model)
                .unwrap_or(defaults.dialogue.model),
            timeout: fc
                .dialogue
                .timeout_secs
                .map_or(defaults.dialogue.timeout, Duration::from_secs),
            abort_on_error: fc
                .dialogue
                .abort_on_error
                .unwrap_or(defaults.dialogue.abort_on_error),
        };

        let speed = match env("VOICELINK_SPEED") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("VOICELINK_SPEED is not a number: {raw}")))?,
            None => fc.synthesis.speed.unwrap_or(defaults.synthesis.speed),
        };

        let synthesis = SynthesisConfig {
            url: env("VOICELINK_SYNTHESIS_URL")
                .or(fc.synthesis.url)
                .unwrap_or(defaults.synthesis.url),
            language: env("VOICELINK_LANGUAGE")
                .or(fc.synthesis.language)
                .unwrap_or(defaults.synthesis.language),
            speed,
        };

        let config = Self {
            segmenter,
            transcription,
            dialogue,
            synthesis,
            excluded_phrases: fc
                .filter
                .excluded_phrases
                .unwrap_or(defaults.excluded_phrases),
            shutdown_grace: fc
                .shutdown
                .grace_ms
                .map_or(defaults.shutdown_grace, Duration::from_millis),
            utterance_dir: fc.debug.utterance_dir,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.segmenter.hangover_frames == 0 {
            return Err(Error::Config(
                "segmenter.hangover_frames must be at least 1".to_string(),
            ));
        }
        if self.segmenter.min_utterance_secs.is_nan() || self.segmenter.min_utterance_secs < 0.0 {
            return Err(Error::Config(format!(
                "segmenter.min_utterance_secs must be non-negative, got {}",
                self.segmenter.min_utterance_secs
            )));
        }
        if self.synthesis.speed.is_nan() || self.synthesis.speed <= 0.0 {
            return Err(Error::Config(format!(
                "synthesis.speed must be positive, got {}",
                self.synthesis.speed
            )));
        }

        for (name, url) in [
            ("transcription.url", &self.transcription.url),
            ("dialogue.url", &self.dialogue.url),
            ("synthesis.url", &self.synthesis.url),
        ] {
            if url.trim().is_empty() {
                return Err(Error::Config(format!("{name} must not be empty")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(file::VoicelinkConfigFile::default(), no_env).unwrap();

        assert_eq!(config.segmenter.hangover_frames, 5);
        assert!((config.segmenter.min_utterance_secs - 0.40).abs() < f64::EPSILON);
        assert_eq!(config.segmenter.classifier, ClassifierKind::WebRtc);
        assert_eq!(config.dialogue.model, "gemma2:9b");
        assert!(!config.dialogue.abort_on_error);
        assert_eq!(config.synthesis.url, "ws://localhost:8001/ws");
        assert_eq!(config.synthesis.language, "ru");
        assert_eq!(config.excluded_phrases.len(), 3);
        assert_eq!(config.shutdown_grace, Duration::from_secs(1));
    }

    #[test]
    fn test_env_overrides_file() {
        let fc = file::parse_config_file(
            r#"
            [synthesis]
            language = "en"
            speed = 1.5

            [dialogue]
            model = "llama3"
            "#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            ("VOICELINK_LANGUAGE", "de"),
            ("VOICELINK_SYNTHESIS_URL", "ws://tts:9000/ws"),
        ]
        .into_iter()
        .collect();

        let config =
            Config::from_sources(fc, |key| env.get(key).map(ToString::to_string)).unwrap();

        assert_eq!(config.synthesis.language, "de");
        assert_eq!(config.synthesis.url, "ws://tts:9000/ws");
        assert!((config.synthesis.speed - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.dialogue.model, "llama3");
    }

    #[test]
    fn test_bad_speed_override() {
        let result = Config::from_sources(file::VoicelinkConfigFile::default(), |key| {
            (key == "VOICELINK_SPEED").then(|| "fast".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.segmenter.hangover_frames = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.synthesis.speed = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.segmenter.min_utterance_secs = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.transcription.url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_excluded_phrases_replace_defaults() {
        let fc = file::parse_config_file("[filter]\nexcluded_phrases = []\n").unwrap();
        let config = Config::from_sources(fc, no_env).unwrap();
        assert!(config.excluded_phrases.is_empty());
    }
}
