//! Audio playback to speakers
//!
//! The synthesis service streams raw 8kHz mono 16-bit little-endian PCM.
//! Chunks are queued as they arrive and drained by the output callback.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};

use super::pcm::{self, PLAYBACK_SAMPLE_RATE};
use crate::{Error, Result};

/// Longest wait for a reply to finish playing
const FINISH_TIMEOUT: Duration = Duration::from_secs(300);

/// Plays raw PCM chunks in the order they are written
#[async_trait(?Send)]
pub trait PlaybackSink {
    /// Queue one chunk of raw PCM bytes
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the sink can no longer accept audio
    fn write(&mut self, chunk: &[u8]) -> Result<()>;

    /// Wait until everything written so far has been played
    async fn finish(&mut self) {}
}

#[async_trait(?Send)]
impl<P: PlaybackSink + ?Sized> PlaybackSink for Box<P> {
    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        (**self).write(chunk)
    }

    async fn finish(&mut self) {
        (**self).finish().await;
    }
}

/// Reassembles 16-bit samples from byte chunks that may split a sample
#[derive(Debug, Default)]
pub struct PcmAssembler {
    carry: Option<u8>,
}

impl PcmAssembler {
    /// Convert a chunk to normalized samples, holding back a trailing odd byte
    pub fn push(&mut self, chunk: &[u8]) -> Vec<f32> {
        let mut bytes = Vec::with_capacity(chunk.len() + 1);
        bytes.extend(self.carry.take());
        bytes.extend_from_slice(chunk);

        if bytes.len() % 2 != 0 {
            self.carry = bytes.pop();
        }

        bytes
            .chunks_exact(2)
            .map(|pair| pcm::pcm16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
            .collect()
    }
}

/// Streams audio to the default output device
pub struct AudioPlayback {
    queue: Arc<Mutex<VecDeque<f32>>>,
    assembler: PcmAssembler,
    _stream: Stream,
}

impl AudioPlayback {
    /// Open the default output device at the synthesis sample rate
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();
        let channels = usize::from(config.channels);

        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let reader = Arc::clone(&queue);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut queue) = reader.lock() else {
                        data.fill(0.0);
                        return;
                    };

                    for frame in data.chunks_mut(channels) {
                        let sample = queue.pop_front().unwrap_or(0.0);
                        frame.fill(sample);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            queue,
            assembler: PcmAssembler::default(),
            _stream: stream,
        })
    }

    /// Samples queued but not yet played
    #[must_use]
    pub fn pending_samples(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or_default()
    }

    /// Wait until queued audio has played or `timeout` elapses
    pub async fn drain(&self, timeout: Duration) {
        let start = Instant::now();

        while self.pending_samples() > 0 {
            if start.elapsed() > timeout {
                tracing::debug!(pending = self.pending_samples(), "playback drain timed out");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[async_trait(?Send)]
impl PlaybackSink for AudioPlayback {
    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let samples = self.assembler.push(chunk);

        let mut queue = self
            .queue
            .lock()
            .map_err(|_| Error::Playback("playback queue poisoned".to_string()))?;
        queue.extend(samples);

        tracing::trace!(bytes = chunk.len(), queued = queue.len(), "audio chunk queued");
        Ok(())
    }

    async fn finish(&mut self) {
        self.drain(FINISH_TIMEOUT).await;
    }
}
