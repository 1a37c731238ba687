//! Conversation loop
//!
//! Pulls frames from a [`FrameSource`], segments them into utterances and runs
//! each utterance through transcription, filtering, reply generation and
//! streamed synthesis before listening again.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::voice::{
    DialogueClient, FrameSource, HttpTranscriber, OllamaClient, PhraseFilter, PlaybackSink,
    SAMPLE_RATE, Segmenter, SpeechStreamClient, StreamEnd, TranscriptionClient, Utterance,
    UtteranceGate, VoiceClassifier, build_classifier, dump_utterance,
};
use crate::{Error, Result};

/// What happened to one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtteranceOutcome {
    /// Shorter than the minimum duration
    TooShort,
    /// Transcript matched an excluded phrase
    Excluded,
    /// Reply was streamed to the sink
    Spoken(StreamEnd),
    /// Shutdown requested between stages
    Cancelled,
}

/// Owns every stage of the pipeline for the lifetime of the process
pub struct Orchestrator {
    segmenter: Segmenter<Box<dyn VoiceClassifier>>,
    gate: UtteranceGate,
    filter: PhraseFilter,
    transcriber: Box<dyn TranscriptionClient>,
    dialogue: Box<dyn DialogueClient>,
    model: String,
    abort_on_dialogue_error: bool,
    synthesis: SpeechStreamClient,
    sink: Box<dyn PlaybackSink>,
    utterance_dir: Option<PathBuf>,
    utterance_seq: u64,
}

impl Orchestrator {
    /// Build the pipeline from configuration with the given playback sink
    ///
    /// # Errors
    ///
    /// Returns error if the classifier or a client cannot be initialized
    pub fn from_config(config: &Config, sink: Box<dyn PlaybackSink>) -> Result<Self> {
        let classifier = build_classifier(
            config.segmenter.classifier,
            SAMPLE_RATE,
            config.segmenter.energy_threshold,
        )?;

        let transcriber = HttpTranscriber::new(
            config.transcription.url.clone(),
            config.transcription.timeout,
        )?;
        let dialogue = OllamaClient::new(config.dialogue.url.clone(), config.dialogue.timeout)?;
        let synthesis = SpeechStreamClient::new(
            config.synthesis.url.clone(),
            config.synthesis.language.clone(),
            config.synthesis.speed,
        )?;

        let orchestrator = Self::builder(
            Segmenter::new(classifier, SAMPLE_RATE, config.segmenter.hangover_frames),
            Box::new(transcriber),
            Box::new(dialogue),
            synthesis,
            sink,
        )
        .gate(UtteranceGate::new(config.segmenter.min_utterance_secs))
        .filter(PhraseFilter::new(config.excluded_phrases.iter().cloned()))
        .model(config.dialogue.model.clone())
        .abort_on_dialogue_error(config.dialogue.abort_on_error)
        .utterance_dir(config.utterance_dir.clone())
        .build();

        tracing::info!(
            transcription = %config.transcription.url,
            dialogue = %config.dialogue.url,
            model = %config.dialogue.model,
            synthesis = %config.synthesis.url,
            excluded_phrases = config.excluded_phrases.len(),
            "pipeline ready"
        );

        Ok(orchestrator)
    }

    /// Start building a pipeline from explicit stages
    #[must_use]
    pub fn builder(
        segmenter: Segmenter<Box<dyn VoiceClassifier>>,
        transcriber: Box<dyn TranscriptionClient>,
        dialogue: Box<dyn DialogueClient>,
        synthesis: SpeechStreamClient,
        sink: Box<dyn PlaybackSink>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            inner: Self {
                segmenter,
                gate: UtteranceGate::default(),
                filter: PhraseFilter::default(),
                transcriber,
                dialogue,
                model: crate::config::DEFAULT_MODEL.to_string(),
                abort_on_dialogue_error: false,
                synthesis,
                sink,
                utterance_dir: None,
                utterance_seq: 0,
            },
        }
    }

    /// Run until the source fails or `cancel` fires
    ///
    /// Audio captured while an utterance is being handled is discarded.
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the frame source fails, or any other fatal
    /// error raised while handling an utterance
    #[allow(clippy::future_not_send)]
    pub async fn run(
        &mut self,
        source: &mut dyn FrameSource,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracing::info!("listening");

        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => break,
                frame = source.next_frame() => frame?,
            };

            let Some(utterance) = self.segmenter.process(&frame) else {
                continue;
            };

            match self.handle_utterance(utterance, cancel).await {
                Ok(UtteranceOutcome::Cancelled) => break,
                Ok(outcome) => tracing::debug!(?outcome, "utterance handled"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::error!(error = %e, "utterance aborted"),
            }

            source.discard_pending();
        }

        tracing::info!("conversation loop stopped");
        Ok(())
    }

    /// Take one utterance through the remaining stages
    ///
    /// Cancellation is checked between stages, never during a remote call.
    /// A spoken reply returns only once the sink has played it out.
    ///
    /// # Errors
    ///
    /// Returns the error of the stage that aborted the utterance
    #[allow(clippy::future_not_send)]
    pub async fn handle_utterance(
        &mut self,
        utterance: Utterance,
        cancel: &CancellationToken,
    ) -> Result<UtteranceOutcome> {
        let duration = utterance.duration_secs();

        if !self.gate.accept(&utterance) {
            tracing::debug!(
                duration,
                min = self.gate.min_duration_secs(),
                "utterance too short"
            );
            return Ok(UtteranceOutcome::TooShort);
        }

        self.dump(&utterance);

        if cancel.is_cancelled() {
            return Ok(UtteranceOutcome::Cancelled);
        }

        tracing::info!(duration, "transcribing utterance");
        let transcript = self.transcriber.transcribe(utterance.samples()).await?;

        if self.filter.should_drop(&transcript) {
            tracing::info!(transcript = %transcript, "excluded phrase, ignoring");
            return Ok(UtteranceOutcome::Excluded);
        }

        if cancel.is_cancelled() {
            return Ok(UtteranceOutcome::Cancelled);
        }

        let reply = match self.dialogue.reply(&self.model, &transcript).await {
            Ok(reply) => reply,
            Err(e) if self.abort_on_dialogue_error => return Err(e),
            Err(e) => {
                tracing::error!(error = %e, "reply generation failed, continuing with empty reply");
                String::new()
            }
        };

        if cancel.is_cancelled() {
            return Ok(UtteranceOutcome::Cancelled);
        }

        let end = self.synthesis.speak(&reply, &mut self.sink).await?;
        log_stream_end(&end);

        // Queued audio is still playing; listening resumes once it is out
        tokio::select! {
            () = self.sink.finish() => {}
            () = cancel.cancelled() => {}
        }

        Ok(UtteranceOutcome::Spoken(end))
    }

    fn dump(&mut self, utterance: &Utterance) {
        let Some(dir) = &self.utterance_dir else {
            return;
        };

        self.utterance_seq += 1;
        if let Err(e) = dump_utterance(dir, self.utterance_seq, utterance) {
            tracing::warn!(error = %e, "failed to save utterance");
        }
    }
}

fn log_stream_end(end: &StreamEnd) {
    match end {
        StreamEnd::Completed => tracing::debug!("synthesis stream completed"),
        StreamEnd::Closed {
            code,
            expected: true,
        } => tracing::debug!(?code, "synthesis stream closed by peer"),
        StreamEnd::Closed { code, .. } => {
            let e = Error::StreamProtocol(format!("unexpected close code {code:?}"));
            tracing::warn!(error = %e, "synthesis stream ended early");
        }
        StreamEnd::ConnectionLost(reason) => {
            let e = Error::StreamProtocol(reason.clone());
            tracing::warn!(error = %e, "synthesis stream ended early");
        }
    }
}

/// Optional stages for [`Orchestrator::builder`]
pub struct OrchestratorBuilder {
    inner: Orchestrator,
}

impl OrchestratorBuilder {
    /// Minimum-duration gate
    #[must_use]
    pub fn gate(mut self, gate: UtteranceGate) -> Self {
        self.inner.gate = gate;
        self
    }

    /// Excluded-phrase filter
    #[must_use]
    pub fn filter(mut self, filter: PhraseFilter) -> Self {
        self.inner.filter = filter;
        self
    }

    /// Reply model identifier
    #[must_use]
    pub fn model(mut self, model: String) -> Self {
        self.inner.model = model;
        self
    }

    /// Abandon the utterance when reply generation fails
    #[must_use]
    pub fn abort_on_dialogue_error(mut self, abort: bool) -> Self {
        self.inner.abort_on_dialogue_error = abort;
        self
    }

    /// Save every gated utterance as WAV under `dir`
    #[must_use]
    pub fn utterance_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.inner.utterance_dir = dir;
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> Orchestrator {
        self.inner
    }
}
