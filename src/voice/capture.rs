//! Audio capture from microphone
//!
//! The device callback pushes sample blocks into a bounded channel; when the
//! consumer is busy the channel fills and further audio is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::pcm::{self, FRAME_SAMPLES, Frame, SAMPLE_RATE};
use crate::{Error, Result};

/// Device callback blocks buffered before audio is dropped (~2s)
const CAPTURE_QUEUE_BLOCKS: usize = 200;

/// Pull-based source of fixed-size frames
#[async_trait(?Send)]
pub trait FrameSource {
    /// Wait for the next frame
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the source can no longer produce frames
    async fn next_frame(&mut self) -> Result<Frame>;

    /// Throw away audio captured while the consumer was busy
    fn discard_pending(&mut self) {}
}

/// Captures 16kHz mono frames from the default input device
pub struct AudioCapture {
    config: StreamConfig,
    rx: Option<mpsc::Receiver<Vec<i16>>>,
    stream: Option<Stream>,
    pending: Vec<i16>,
    dropped_blocks: Arc<AtomicUsize>,
}

impl AudioCapture {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            rx: None,
            stream: None,
            pending: Vec::with_capacity(FRAME_SAMPLES * 2),
            dropped_blocks: Arc::default(),
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if capture fails
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let (tx, rx) = mpsc::channel::<Vec<i16>>(CAPTURE_QUEUE_BLOCKS);
        let dropped = Arc::clone(&self.dropped_blocks);

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let block: Vec<i16> = data.iter().copied().map(pcm::f32_to_pcm16).collect();
                    if tx.try_send(block).is_err() {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);
        self.rx = Some(rx);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.rx = None;
            self.pending.clear();
            tracing::debug!("audio capture stopped");
        }
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

#[async_trait(?Send)]
impl FrameSource for AudioCapture {
    async fn next_frame(&mut self) -> Result<Frame> {
        let rx = self
            .rx
            .as_mut()
            .ok_or_else(|| Error::Audio("capture not started".to_string()))?;

        while self.pending.len() < FRAME_SAMPLES {
            let block = rx
                .recv()
                .await
                .ok_or_else(|| Error::Audio("capture stream closed".to_string()))?;
            self.pending.extend_from_slice(&block);
        }

        let rest = self.pending.split_off(FRAME_SAMPLES);
        let samples = std::mem::replace(&mut self.pending, rest);
        Frame::new(samples)
    }

    fn discard_pending(&mut self) {
        let mut discarded = self.pending.len();
        self.pending.clear();

        if let Some(rx) = self.rx.as_mut() {
            while let Ok(block) = rx.try_recv() {
                discarded += block.len();
            }
        }

        let dropped = self.dropped_blocks.swap(0, Ordering::Relaxed);

        if discarded > 0 || dropped > 0 {
            tracing::debug!(
                discarded_samples = discarded,
                dropped_blocks = dropped,
                "discarded audio captured during round trip"
            );
        }
    }
}
