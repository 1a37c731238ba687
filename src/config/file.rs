//! TOML configuration file loading
//!
//! Supports `~/.config/voicelink/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::ClassifierKind;
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoicelinkConfigFile {
    /// Segmentation configuration
    #[serde(default)]
    pub segmenter: SegmenterFileConfig,

    /// Transcription service configuration
    #[serde(default)]
    pub transcription: TranscriptionFileConfig,

    /// Reply generation configuration
    #[serde(default)]
    pub dialogue: DialogueFileConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub synthesis: SynthesisFileConfig,

    /// Transcript filter configuration
    #[serde(default)]
    pub filter: FilterFileConfig,

    /// Shutdown behavior
    #[serde(default)]
    pub shutdown: ShutdownFileConfig,

    /// Debugging aids
    #[serde(default)]
    pub debug: DebugFileConfig,
}

/// Voice-activity segmentation
#[derive(Debug, Default, Deserialize)]
pub struct SegmenterFileConfig {
    /// Silent frames tolerated before an utterance closes
    pub hangover_frames: Option<usize>,

    /// Utterances shorter than this are never transcribed
    pub min_utterance_secs: Option<f64>,

    /// Classifier backend ("webrtc" or "energy")
    pub classifier: Option<ClassifierKind>,

    /// RMS threshold for the energy classifier
    pub energy_threshold: Option<f32>,
}

/// Transcription service
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptionFileConfig {
    /// Endpoint receiving raw f32 PCM
    pub url: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Reply generation service
#[derive(Debug, Default, Deserialize)]
pub struct DialogueFileConfig {
    /// Base URL of the model server
    pub url: Option<String>,

    /// Model identifier (e.g. "gemma2:9b")
    pub model: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Abandon the utterance when reply generation fails
    pub abort_on_error: Option<bool>,
}

/// Speech synthesis stream
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisFileConfig {
    /// WebSocket endpoint
    pub url: Option<String>,

    /// Language code sent with every request
    pub language: Option<String>,

    /// Speed multiplier
    pub speed: Option<f64>,
}

/// Transcript filter
#[derive(Debug, Default, Deserialize)]
pub struct FilterFileConfig {
    /// Transcripts dropped before reply generation (replaces the defaults)
    pub excluded_phrases: Option<Vec<String>>,
}

/// Shutdown behavior
#[derive(Debug, Default, Deserialize)]
pub struct ShutdownFileConfig {
    /// Delay between interrupt and exit, in milliseconds
    pub grace_ms: Option<u64>,
}

/// Debugging aids
#[derive(Debug, Default, Deserialize)]
pub struct DebugFileConfig {
    /// Directory receiving a WAV of every gated utterance
    pub utterance_dir: Option<PathBuf>,
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed or has unknown sections
pub fn parse_config_file(content: &str) -> Result<VoicelinkConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file
///
/// An explicit `path` must exist and parse. Without one, the standard path is
/// used and a missing file yields defaults.
///
/// # Errors
///
/// Returns error if an explicit file is missing, or any file fails to parse
pub fn load_config_file(path: Option<&Path>) -> Result<VoicelinkConfigFile> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match config_file_path() {
            Some(p) => (p, false),
            None => return Ok(VoicelinkConfigFile::default()),
        },
    };

    if !path.exists() {
        if explicit {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(VoicelinkConfigFile::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|e| {
        Error::Config(format!("failed to read {}: {e}", path.display()))
    })?;

    let config = parse_config_file(&content).map_err(|e| {
        Error::Config(format!("failed to parse {}: {e}", path.display()))
    })?;

    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/voicelink/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voicelink").join("config.toml"))
}
