//! Error types for voicelink

use thiserror::Error;

/// Result type alias for voicelink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice loop
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error (capture or output)
    #[error("audio error: {0}")]
    Audio(String),

    /// Voice classifier rejected a frame
    #[error("classification error: {0}")]
    Classification(String),

    /// Malformed sample data
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Speech-to-text error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Reply generation error
    #[error("dialogue error: {0}")]
    Dialogue(String),

    /// Synthesis stream could not be opened or the request could not be sent
    #[error("stream connect error: {0}")]
    StreamConnect(String),

    /// Synthesis stream ended abnormally
    #[error("stream protocol error: {0}")]
    StreamProtocol(String),

    /// Playback sink rejected audio
    #[error("playback error: {0}")]
    Playback(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl Error {
    /// Whether this error should terminate the process
    ///
    /// Only device and configuration failures are fatal; everything else is
    /// scoped to a single frame or utterance.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Audio(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Audio("no input device".into()).is_fatal());
        assert!(Error::Config("bad speed".into()).is_fatal());
        assert!(!Error::Transcription("missing field".into()).is_fatal());
        assert!(!Error::StreamConnect("refused".into()).is_fatal());
        assert!(!Error::Classification("odd frame".into()).is_fatal());
    }
}
