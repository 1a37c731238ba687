//! voicelink - hands-free spoken conversation loop
//!
//! Listens on the microphone, cuts speech into utterances, and for each one
//! asks remote services for a transcript, a reply, and synthesized speech
//! that is played back as it streams in.
//!
//! # Architecture
//!
//! ```text
//! microphone ─▶ Segmenter ─▶ Gate ─▶ Transcription ─▶ Filter
//!                                                       │
//!       speaker ◀── Speech stream (WebSocket) ◀── Dialogue
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod shutdown;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, UtteranceOutcome};
