//! WAV export of utterances for debugging

use std::path::{Path, PathBuf};

use super::pcm;
use super::segmenter::Utterance;
use crate::{Error, Result};

/// Convert f32 samples to 16-bit mono WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(pcm::f32_to_pcm16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Write an utterance to `dir` as `utterance-<seq>.wav`
///
/// # Errors
///
/// Returns error if the directory cannot be created or the file written
pub fn dump_utterance(dir: &Path, seq: u64, utterance: &Utterance) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let path = dir.join(format!("utterance-{seq:05}.wav"));
    let wav = samples_to_wav(utterance.samples(), utterance.sample_rate())?;
    std::fs::write(&path, wav)?;

    tracing::debug!(path = %path.display(), "utterance saved");
    Ok(path)
}
