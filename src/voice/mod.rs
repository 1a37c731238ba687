//! Voice processing module
//!
//! Frame capture, voice-activity segmentation, gating, the remote
//! transcription and dialogue clients, the synthesis stream, and playback.

mod capture;
mod classifier;
mod dialogue;
mod gate;
pub mod pcm;
mod playback;
mod segmenter;
mod stt;
mod tts;
mod wav;

pub use capture::{AudioCapture, FrameSource};
pub use classifier::{EnergyClassifier, VoiceClassifier, WebRtcClassifier, build_classifier};
pub use dialogue::{DialogueClient, OllamaClient};
pub use gate::{
    DEFAULT_EXCLUDED_PHRASES, DEFAULT_MIN_UTTERANCE_SECS, PhraseFilter, UtteranceGate,
};
pub use pcm::{FRAME_SAMPLES, Frame, PLAYBACK_SAMPLE_RATE, SAMPLE_RATE};
pub use playback::{AudioPlayback, PcmAssembler, PlaybackSink};
pub use segmenter::{
    ActivityState, DEFAULT_HANGOVER_FRAMES, Segmenter, SegmenterState, Utterance,
};
pub use stt::{HttpTranscriber, TranscriptionClient, parse_transcription};
pub use tts::{
    END_OF_AUDIO, SpeechStream, SpeechStreamClient, StreamEnd, StreamEvent, SynthesisRequest,
    TYPE_FIELD, WsStream, play_stream,
};
pub use wav::{dump_utterance, samples_to_wav};
