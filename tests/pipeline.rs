//! Conversation pipeline integration tests
//!
//! Runs the orchestrator against scripted frames, spy clients and an
//! in-process synthesis server. No audio hardware is needed.

use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use voicelink::voice::{SAMPLE_RATE, SpeechStreamClient, StreamEnd, Utterance};
use voicelink::{Error, Orchestrator, UtteranceOutcome};

mod common;

use common::{
    FailingFrameSource, Journal, RecordingSink, SpyDialogue, SpyTranscriber, VecFrameSource,
    frames_for, scripted_segmenter, spawn_synthesis_server, speech,
};

/// Nothing listens here; connecting fails immediately
const DEAD_SYNTHESIS_URL: &str = "ws://127.0.0.1:1/ws";

fn orchestrator(
    transcriber: &SpyTranscriber,
    dialogue: &SpyDialogue,
    synthesis_url: &str,
    sink: &RecordingSink,
) -> Orchestrator {
    let synthesis =
        SpeechStreamClient::new(synthesis_url.to_string(), "ru".to_string(), 1.0).unwrap();

    Orchestrator::builder(
        scripted_segmenter(),
        Box::new(transcriber.clone()),
        Box::new(dialogue.clone()),
        synthesis,
        Box::new(sink.clone()),
    )
    .build()
}

fn utterance(secs: f64) -> Utterance {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let len = (secs * f64::from(SAMPLE_RATE)) as usize;
    Utterance::from_frames(vec![vec![0.25; len]], SAMPLE_RATE)
}

fn speaking_script() -> Vec<Message> {
    vec![
        Message::Binary(b"ABCD".to_vec()),
        Message::Text(r#"{"type":"end_of_audio"}"#.to_string()),
    ]
}

#[tokio::test]
async fn test_long_utterance_reaches_synthesis() {
    let (url, server) = spawn_synthesis_server(speaking_script()).await;

    let transcriber = SpyTranscriber::replying("привет");
    let dialogue = SpyDialogue::replying("здравствуй");
    let sink = RecordingSink::default();
    let mut orch = orchestrator(&transcriber, &dialogue, &url, &sink);

    let cancel = CancellationToken::new();
    let voiced = frames_for(0.40);
    let mut source = VecFrameSource::new(speech(voiced, 6), cancel.clone());

    orch.run(&mut source, &cancel).await.unwrap();

    assert_eq!(
        *transcriber.calls.lock().unwrap(),
        vec![voiced * voicelink::voice::FRAME_SAMPLES]
    );
    assert_eq!(
        *dialogue.calls.lock().unwrap(),
        vec![("gemma2:9b".to_string(), "привет".to_string())]
    );
    assert_eq!(sink.chunks(), vec![b"ABCD".to_vec()]);
    assert_eq!(source.discard_count(), 1);

    let request: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(request["message"], "здравствуй");
    assert_eq!(request["language"], "ru");
    assert_eq!(request["speed"], 1.0);
}

#[tokio::test]
async fn test_listening_resumes_after_playback_finishes() {
    let (url, _server) = spawn_synthesis_server(speaking_script()).await;

    let journal = Journal::default();
    let transcriber = SpyTranscriber::replying("привет");
    let dialogue = SpyDialogue::replying("здравствуй");
    let sink = RecordingSink::with_journal(journal.clone());
    let mut orch = orchestrator(&transcriber, &dialogue, &url, &sink);

    let cancel = CancellationToken::new();
    let mut source = VecFrameSource::with_journal(speech(30, 6), cancel.clone(), journal.clone());

    orch.run(&mut source, &cancel).await.unwrap();

    assert_eq!(*journal.lock().unwrap(), vec!["write", "finish", "discard"]);
}

#[tokio::test]
async fn test_finish_skipped_when_synthesis_unreachable() {
    let journal = Journal::default();
    let transcriber = SpyTranscriber::replying("привет");
    let dialogue = SpyDialogue::replying("здравствуй");
    let sink = RecordingSink::with_journal(journal.clone());
    let mut orch = orchestrator(&transcriber, &dialogue, DEAD_SYNTHESIS_URL, &sink);

    let cancel = CancellationToken::new();
    let mut source = VecFrameSource::with_journal(speech(30, 6), cancel.clone(), journal.clone());

    orch.run(&mut source, &cancel).await.unwrap();

    assert_eq!(*journal.lock().unwrap(), vec!["discard"]);
}

#[tokio::test]
async fn test_short_utterance_never_transcribed() {
    let transcriber = SpyTranscriber::replying("unused");
    let dialogue = SpyDialogue::replying("unused");
    let sink = RecordingSink::default();
    let mut orch = orchestrator(&transcriber, &dialogue, DEAD_SYNTHESIS_URL, &sink);

    let cancel = CancellationToken::new();
    let mut source = VecFrameSource::new(speech(2, 6), cancel.clone());

    orch.run(&mut source, &cancel).await.unwrap();

    assert_eq!(transcriber.call_count(), 0);
    assert_eq!(dialogue.call_count(), 0);
    assert!(sink.chunks().is_empty());
}

#[tokio::test]
async fn test_short_utterance_outcome() {
    let transcriber = SpyTranscriber::replying("unused");
    let dialogue = SpyDialogue::replying("unused");
    let sink = RecordingSink::default();
    let mut orch = orchestrator(&transcriber, &dialogue, DEAD_SYNTHESIS_URL, &sink);

    let outcome = orch
        .handle_utterance(utterance(0.04), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, UtteranceOutcome::TooShort);
}

#[tokio::test]
async fn test_excluded_phrase_skips_dialogue() {
    let transcriber = SpyTranscriber::replying("Продолжение следует...");
    let dialogue = SpyDialogue::replying("unused");
    let sink = RecordingSink::default();
    let mut orch = orchestrator(&transcriber, &dialogue, DEAD_SYNTHESIS_URL, &sink);

    let outcome = orch
        .handle_utterance(utterance(1.0), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, UtteranceOutcome::Excluded);
    assert_eq!(transcriber.call_count(), 1);
    assert_eq!(dialogue.call_count(), 0);
}

#[tokio::test]
async fn test_connect_failure_resumes_listening() {
    let transcriber = SpyTranscriber::replying("привет");
    let dialogue = SpyDialogue::replying("здравствуй");
    let sink = RecordingSink::default();
    let mut orch = orchestrator(&transcriber, &dialogue, DEAD_SYNTHESIS_URL, &sink);

    let result = orch
        .handle_utterance(utterance(1.0), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(Error::StreamConnect(_))));

    // Two utterances back to back: the first failure must not stop the loop
    let cancel = CancellationToken::new();
    let mut frames = speech(30, 6);
    frames.extend(speech(30, 6));
    let mut source = VecFrameSource::new(frames, cancel.clone());

    orch.run(&mut source, &cancel).await.unwrap();

    assert_eq!(transcriber.call_count(), 3);
    assert_eq!(dialogue.call_count(), 3);
    assert!(sink.chunks().is_empty());
    assert_eq!(source.discard_count(), 2);
}

#[tokio::test]
async fn test_transcription_failure_aborts_utterance() {
    let transcriber = SpyTranscriber::failing("503 Service Unavailable");
    let dialogue = SpyDialogue::replying("unused");
    let sink = RecordingSink::default();
    let mut orch = orchestrator(&transcriber, &dialogue, DEAD_SYNTHESIS_URL, &sink);

    let result = orch
        .handle_utterance(utterance(1.0), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::Transcription(_))));
    assert_eq!(dialogue.call_count(), 0);
}

#[tokio::test]
async fn test_dialogue_failure_speaks_empty_reply() {
    let (url, server) = spawn_synthesis_server(speaking_script()).await;

    let transcriber = SpyTranscriber::replying("привет");
    let dialogue = SpyDialogue::failing("model not found");
    let sink = RecordingSink::default();
    let mut orch = orchestrator(&transcriber, &dialogue, &url, &sink);

    let outcome = orch
        .handle_utterance(utterance(1.0), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, UtteranceOutcome::Spoken(StreamEnd::Completed));

    let request: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(request["message"], "");
}

#[tokio::test]
async fn test_dialogue_failure_can_abort() {
    let transcriber = SpyTranscriber::replying("привет");
    let dialogue = SpyDialogue::failing("model not found");
    let sink = RecordingSink::default();

    let synthesis =
        SpeechStreamClient::new(DEAD_SYNTHESIS_URL.to_string(), "ru".to_string(), 1.0).unwrap();
    let mut orch = Orchestrator::builder(
        scripted_segmenter(),
        Box::new(transcriber),
        Box::new(dialogue),
        synthesis,
        Box::new(sink.clone()),
    )
    .abort_on_dialogue_error(true)
    .build();

    let result = orch
        .handle_utterance(utterance(1.0), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::Dialogue(_))));
    assert!(sink.chunks().is_empty());
}

#[tokio::test]
async fn test_cancel_checked_before_transcription() {
    let transcriber = SpyTranscriber::replying("привет");
    let dialogue = SpyDialogue::replying("здравствуй");
    let sink = RecordingSink::default();
    let mut orch = orchestrator(&transcriber, &dialogue, DEAD_SYNTHESIS_URL, &sink);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = orch.handle_utterance(utterance(1.0), &cancel).await.unwrap();

    assert_eq!(outcome, UtteranceOutcome::Cancelled);
    assert_eq!(transcriber.call_count(), 0);
}

#[tokio::test]
async fn test_custom_model_and_filter() {
    let transcriber = SpyTranscriber::replying("hello there");
    let dialogue = SpyDialogue::replying("unused");
    let sink = RecordingSink::default();

    let synthesis =
        SpeechStreamClient::new(DEAD_SYNTHESIS_URL.to_string(), "en".to_string(), 1.0).unwrap();
    let mut orch = Orchestrator::builder(
        scripted_segmenter(),
        Box::new(transcriber),
        Box::new(dialogue.clone()),
        synthesis,
        Box::new(sink),
    )
    .model("llama3".to_string())
    .filter(voicelink::voice::PhraseFilter::new(["Thanks for watching!"]))
    .build();

    let result = orch
        .handle_utterance(utterance(1.0), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::StreamConnect(_))));
    assert_eq!(
        *dialogue.calls.lock().unwrap(),
        vec![("llama3".to_string(), "hello there".to_string())]
    );
}

#[tokio::test]
async fn test_gated_utterance_saved_as_wav() {
    let dir = tempfile::tempdir().unwrap();

    let transcriber = SpyTranscriber::replying("Продолжение следует...");
    let dialogue = SpyDialogue::replying("unused");
    let synthesis =
        SpeechStreamClient::new(DEAD_SYNTHESIS_URL.to_string(), "ru".to_string(), 1.0).unwrap();
    let mut orch = Orchestrator::builder(
        scripted_segmenter(),
        Box::new(transcriber),
        Box::new(dialogue),
        synthesis,
        Box::new(RecordingSink::default()),
    )
    .utterance_dir(Some(dir.path().to_path_buf()))
    .build();

    let cancel = CancellationToken::new();
    orch.handle_utterance(utterance(0.01), &cancel).await.unwrap();
    orch.handle_utterance(utterance(1.0), &cancel).await.unwrap();

    let saved: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(saved, vec!["utterance-00001.wav".to_string()]);
}

#[tokio::test]
async fn test_capture_failure_is_fatal() {
    let transcriber = SpyTranscriber::replying("unused");
    let dialogue = SpyDialogue::replying("unused");
    let sink = RecordingSink::default();
    let mut orch = orchestrator(&transcriber, &dialogue, DEAD_SYNTHESIS_URL, &sink);

    let result = orch
        .run(&mut FailingFrameSource, &CancellationToken::new())
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Audio(_)));
    assert!(err.is_fatal());
}
