//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use voicelink::voice::{
    DialogueClient, FRAME_SAMPLES, Frame, FrameSource, PlaybackSink, SAMPLE_RATE, Segmenter,
    TranscriptionClient, VoiceClassifier,
};
use voicelink::{Error, Result};

/// Frame the scripted classifier reports as voice
#[must_use]
pub fn voiced_frame() -> Frame {
    Frame::new(vec![1000; FRAME_SAMPLES]).expect("valid frame")
}

/// Frame the scripted classifier reports as silence
#[must_use]
pub fn silent_frame() -> Frame {
    Frame::new(vec![0; FRAME_SAMPLES]).expect("valid frame")
}

/// `voiced` voice frames followed by `silent` silent frames
#[must_use]
pub fn speech(voiced: usize, silent: usize) -> Vec<Frame> {
    std::iter::repeat_with(voiced_frame)
        .take(voiced)
        .chain(std::iter::repeat_with(silent_frame).take(silent))
        .collect()
}

/// Voice frames needed for an utterance of `secs`
#[must_use]
pub fn frames_for(secs: f64) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let frames = (secs * f64::from(SAMPLE_RATE) / FRAME_SAMPLES as f64).ceil() as usize;
    frames
}

/// Classifies any non-zero frame as voice
pub struct ScriptedClassifier;

impl VoiceClassifier for ScriptedClassifier {
    fn classify(&mut self, _sample_rate: u32, frame: &[u8]) -> Result<bool> {
        Ok(frame.iter().any(|b| *b != 0))
    }
}

/// Segmenter over the scripted classifier with the default hangover
#[must_use]
pub fn scripted_segmenter() -> Segmenter<Box<dyn VoiceClassifier>> {
    Segmenter::new(Box::new(ScriptedClassifier), SAMPLE_RATE, 5)
}

/// Transcriber that records every call
#[derive(Clone)]
pub struct SpyTranscriber {
    pub calls: Arc<Mutex<Vec<usize>>>,
    reply: std::result::Result<String, String>,
}

impl SpyTranscriber {
    pub fn replying(transcript: &str) -> Self {
        Self {
            calls: Arc::default(),
            reply: Ok(transcript.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            calls: Arc::default(),
            reply: Err(message.to_string()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TranscriptionClient for SpyTranscriber {
    async fn transcribe(&self, samples: &[f32]) -> Result<String> {
        self.calls.lock().unwrap().push(samples.len());
        self.reply.clone().map_err(Error::Transcription)
    }
}

/// Dialogue client that records every (model, prompt) pair
#[derive(Clone)]
pub struct SpyDialogue {
    pub calls: Arc<Mutex<Vec<(String, String)>>>,
    reply: std::result::Result<String, String>,
}

impl SpyDialogue {
    pub fn replying(reply: &str) -> Self {
        Self {
            calls: Arc::default(),
            reply: Ok(reply.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            calls: Arc::default(),
            reply: Err(message.to_string()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DialogueClient for SpyDialogue {
    async fn reply(&self, model: &str, prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.to_string()));
        self.reply.clone().map_err(Error::Dialogue)
    }
}

/// Ordered record of sink and source calls shared between stubs
pub type Journal = Arc<Mutex<Vec<&'static str>>>;

/// Sink that keeps every chunk it receives
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub chunks: Arc<Mutex<Vec<Vec<u8>>>>,
    pub journal: Journal,
}

impl RecordingSink {
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            chunks: Arc::default(),
            journal,
        }
    }

    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().unwrap().clone()
    }
}

#[async_trait(?Send)]
impl PlaybackSink for RecordingSink {
    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.chunks.lock().unwrap().push(chunk.to_vec());
        self.journal.lock().unwrap().push("write");
        Ok(())
    }

    async fn finish(&mut self) {
        // Playback outlasts the socket
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.journal.lock().unwrap().push("finish");
    }
}

/// Replays a fixed list of frames, then cancels `cancel` and waits forever
pub struct VecFrameSource {
    frames: VecDeque<Frame>,
    cancel: CancellationToken,
    pub discards: Arc<AtomicUsize>,
    journal: Journal,
}

impl VecFrameSource {
    pub fn new(frames: Vec<Frame>, cancel: CancellationToken) -> Self {
        Self::with_journal(frames, cancel, Journal::default())
    }

    pub fn with_journal(frames: Vec<Frame>, cancel: CancellationToken, journal: Journal) -> Self {
        Self {
            frames: frames.into(),
            cancel,
            discards: Arc::default(),
            journal,
        }
    }

    pub fn discard_count(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }
}

#[async_trait(?Send)]
impl FrameSource for VecFrameSource {
    async fn next_frame(&mut self) -> Result<Frame> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(frame);
        }
        self.cancel.cancel();
        std::future::pending().await
    }

    fn discard_pending(&mut self) {
        self.discards.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().unwrap().push("discard");
    }
}

/// Source whose device fails immediately
pub struct FailingFrameSource;

#[async_trait(?Send)]
impl FrameSource for FailingFrameSource {
    async fn next_frame(&mut self) -> Result<Frame> {
        Err(Error::Audio("device unplugged".to_string()))
    }
}

/// Single-connection synthesis server
///
/// Accepts one socket, reads the request, sends `script` in order and then
/// closes. The handle resolves to the request text.
pub async fn spawn_synthesis_server(script: Vec<Message>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        let request = match ws.next().await {
            Some(Ok(Message::Text(text))) => text,
            other => panic!("expected text request, got {other:?}"),
        };

        for message in script {
            ws.send(message).await.unwrap();
        }

        let _ = ws.close(None).await;
        request
    });

    (url, handle)
}
