//! Text-to-speech (TTS) duplex stream
//!
//! One WebSocket is opened per reply. The client sends a single synthesis
//! request, then the server interleaves JSON control events with raw PCM
//! audio on the same socket. There is no wire-level type tag: a message that
//! decodes as a JSON object is a control event, anything else is audio.

use futures::{SinkExt, Stream, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::playback::PlaybackSink;
use crate::{Error, Result};

/// Control field carrying the event kind
pub const TYPE_FIELD: &str = "type";

/// Control event kind marking the end of audio
pub const END_OF_AUDIO: &str = "end_of_audio";

/// Live synthesis socket
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Request sent once at the start of every stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisRequest {
    /// Text to speak
    #[serde(rename = "message")]
    pub text: String,

    /// Language code (e.g. "ru")
    pub language: String,

    /// Speed multiplier
    pub speed: f64,
}

/// One inbound message, classified by whether it parses as JSON
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Structured control message
    Control(Map<String, Value>),
    /// Raw audio bytes for playback
    Audio(Vec<u8>),
}

impl StreamEvent {
    /// Decode an inbound payload
    ///
    /// A JSON object, or `null` as an empty object, is control. Anything else
    /// falls back to audio unchanged.
    #[must_use]
    pub fn decode(payload: Vec<u8>) -> Self {
        match serde_json::from_slice::<Option<Map<String, Value>>>(&payload) {
            Ok(fields) => Self::Control(fields.unwrap_or_default()),
            Err(_) => Self::Audio(payload),
        }
    }

    /// Whether this is the control event that ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Control(fields) => {
                fields.get(TYPE_FIELD).and_then(Value::as_str) == Some(END_OF_AUDIO)
            }
            Self::Audio(_) => false,
        }
    }
}

/// How a synthesis stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Terminal control event received
    Completed,
    /// Peer closed the socket
    Closed {
        /// Close code, `None` if the socket dropped without a close frame
        code: Option<u16>,
        /// Whether the code is a normal or going-away closure
        expected: bool,
    },
    /// Transport failure while reading
    ConnectionLost(String),
}

impl StreamEnd {
    /// Whether the stream delivered all of its audio
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Close codes that count as an orderly shutdown by the peer
const fn is_expected_close(code: CloseCode) -> bool {
    matches!(code, CloseCode::Normal | CloseCode::Away)
}

/// Lazy, in-order sequence of events from one synthesis socket
pub struct SpeechStream<S> {
    inner: S,
    end: Option<StreamEnd>,
}

impl<S> SpeechStream<S>
where
    S: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
    /// Wrap an inbound message stream
    pub const fn new(inner: S) -> Self {
        Self { inner, end: None }
    }

    /// Next event, or `None` once the stream has terminated
    ///
    /// The terminal control event itself is yielded before `None`.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.end.is_some() {
            return None;
        }

        loop {
            let payload = match self.inner.next().await {
                Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
                Some(Ok(WsMessage::Binary(bytes))) => bytes,
                Some(Ok(WsMessage::Close(frame))) => {
                    self.end = Some(closed(frame.as_ref()));
                    return None;
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {
                    continue;
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "synthesis stream error");
                    self.end = Some(StreamEnd::ConnectionLost(e.to_string()));
                    return None;
                }
                None => {
                    tracing::warn!("synthesis stream dropped without close frame");
                    self.end = Some(StreamEnd::Closed {
                        code: None,
                        expected: false,
                    });
                    return None;
                }
            };

            let event = StreamEvent::decode(payload);
            if event.is_terminal() {
                self.end = Some(StreamEnd::Completed);
            }
            return Some(event);
        }
    }

    /// How the stream ended, once it has
    #[must_use]
    pub const fn end(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// Classify a close frame and log it at the matching severity
fn closed(frame: Option<&CloseFrame<'_>>) -> StreamEnd {
    match frame {
        Some(frame) if is_expected_close(frame.code) => {
            tracing::debug!(code = %frame.code, reason = %frame.reason, "synthesis stream closed");
            StreamEnd::Closed {
                code: Some(u16::from(frame.code)),
                expected: true,
            }
        }
        Some(frame) => {
            tracing::warn!(
                code = %frame.code,
                reason = %frame.reason,
                "unexpected synthesis stream closure"
            );
            StreamEnd::Closed {
                code: Some(u16::from(frame.code)),
                expected: false,
            }
        }
        None => {
            tracing::warn!("synthesis stream closed without status");
            StreamEnd::Closed {
                code: None,
                expected: false,
            }
        }
    }
}

/// Drain a speech stream into a playback sink
///
/// Audio is written the moment it arrives, in arrival order.
///
/// # Errors
///
/// Returns `Error::Playback` if the sink rejects a chunk; the stream is
/// abandoned at that point
pub async fn play_stream<S, P>(stream: &mut SpeechStream<S>, sink: &mut P) -> Result<StreamEnd>
where
    S: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
    P: PlaybackSink + ?Sized,
{
    let mut audio_bytes = 0usize;

    while let Some(event) = stream.next_event().await {
        match event {
            StreamEvent::Audio(chunk) => {
                audio_bytes += chunk.len();
                sink.write(&chunk).map_err(|e| {
                    tracing::error!(error = %e, "error writing to speaker");
                    e
                })?;
            }
            StreamEvent::Control(_) if stream.end().is_some() => {
                tracing::info!(audio_bytes, "end of audio");
            }
            StreamEvent::Control(fields) => {
                tracing::info!(message = ?fields, "received control message");
            }
        }
    }

    Ok(stream
        .end()
        .cloned()
        .unwrap_or_else(|| StreamEnd::ConnectionLost("stream ended without status".to_string())))
}

/// Opens synthesis streams against a fixed endpoint
#[derive(Debug, Clone)]
pub struct SpeechStreamClient {
    url: String,
    language: String,
    speed: f64,
}

impl SpeechStreamClient {
    /// Create a client for the service at `url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty or the speed is not positive
    pub fn new(url: String, language: String, speed: f64) -> Result<Self> {
        if url.is_empty() {
            return Err(Error::Config("synthesis URL required".to_string()));
        }
        if speed.is_nan() || speed <= 0.0 {
            return Err(Error::Config(format!("invalid synthesis speed: {speed}")));
        }

        Ok(Self {
            url,
            language,
            speed,
        })
    }

    /// Build the request for a reply
    #[must_use]
    pub fn request(&self, text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            language: self.language.clone(),
            speed: self.speed,
        }
    }

    /// Connect and send the request
    ///
    /// # Errors
    ///
    /// Returns `Error::StreamConnect` if the socket cannot be opened or the
    /// request cannot be sent
    pub async fn open(&self, request: &SynthesisRequest) -> Result<SpeechStream<WsStream>> {
        let (mut ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::StreamConnect(format!("failed to connect to {}: {e}", self.url)))?;

        let json = serde_json::to_string(request)?;
        ws.send(WsMessage::Text(json))
            .await
            .map_err(|e| Error::StreamConnect(format!("failed to send request: {e}")))?;

        tracing::debug!(url = %self.url, chars = request.text.chars().count(), "synthesis request sent");
        Ok(SpeechStream::new(ws))
    }

    /// Synthesize `text` and play the audio as it streams in
    ///
    /// # Errors
    ///
    /// Returns `Error::StreamConnect` if the stream cannot be opened and
    /// `Error::Playback` if the sink fails
    pub async fn speak<P>(&self, text: &str, sink: &mut P) -> Result<StreamEnd>
    where
        P: PlaybackSink + ?Sized,
    {
        let request = self.request(text);
        let mut stream = self.open(&request).await?;
        let end = play_stream(&mut stream, sink).await;

        let mut ws = stream.into_inner();
        if let Err(e) = ws.close(None).await {
            tracing::trace!(error = %e, "synthesis socket already closed");
        }

        end
    }
}
