use std::collections::HashMap;

use thiserror::Error;

use super::audio_buffer::{frame_at, AudioBuffer};
use super::audio_resampler::AudioResampler;
use crate::synthesis::domain::synthesis_result::SynthesisResult;
use crate::timeline::domain::reconciled_timeline::{ReconciledTimeline, SpanKind};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpliceError {
    #[error("no synthesized audio for segment {0}")]
    MissingSynthesis(String),
    #[error("original audio has an unusable format ({sample_rate} Hz, {channels} channels)")]
    InvalidFormat { sample_rate: u32, channels: u16 },
    #[error("could not resample audio for segment {segment_id}: {message}")]
    Resample { segment_id: String, message: String },
    #[error("segment {segment_id} audio is {found_rate} Hz x{found_channels} after resampling, expected {rate} Hz x{channels}")]
    FormatMismatch {
        segment_id: String,
        rate: u32,
        channels: u16,
        found_rate: u32,
        found_channels: u16,
    },
    #[error("spliced audio has {actual} frames, timeline needs {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Assembles the output soundtrack from a reconciled timeline.
pub struct AudioSplicer {
    resampler: Box<dyn AudioResampler>,
}

impl AudioSplicer {
    pub fn new(resampler: Box<dyn AudioResampler>) -> Self {
        Self { resampler }
    }

    /// Copies source frames for original entries and inserts synthesized
    /// audio for edited ones, in the original's sample rate and channel
    /// layout.
    ///
    /// Entry boundaries are rounded to frames from the absolute output
    /// times, so rounding never accumulates across entries. Synthesized audio
    /// is trimmed or zero-padded to fill its entry exactly.
    pub fn splice(
        &self,
        original: &AudioBuffer,
        timeline: &ReconciledTimeline,
        results: &HashMap<String, SynthesisResult>,
    ) -> Result<AudioBuffer, SpliceError> {
        let rate = original.sample_rate();
        let channels = original.channels();
        if rate == 0 || channels == 0 {
            return Err(SpliceError::InvalidFormat {
                sample_rate: rate,
                channels,
            });
        }

        let expected = frame_at(timeline.total_duration(), rate);
        let mut samples: Vec<f32> = Vec::with_capacity(expected * channels as usize);

        for entry in timeline.entries() {
            let start = frame_at(entry.output_start, rate);
            let end = frame_at(entry.output_end, rate);
            let count = end.saturating_sub(start);

            match &entry.kind {
                SpanKind::Original => {
                    let from = frame_at(entry.source_span.start, rate);
                    let copied = original.frame_range(from, from + count);
                    append_fitted(&mut samples, copied, count, channels);
                }
                SpanKind::Synthesized { segment_id } => {
                    let result = results
                        .get(segment_id)
                        .ok_or_else(|| SpliceError::MissingSynthesis(segment_id.clone()))?;
                    let audio = self.normalize(segment_id, &result.audio, original)?;
                    append_fitted(&mut samples, audio.frame_range(0, count), count, channels);
                }
            }
        }

        let spliced = AudioBuffer::new(samples, rate, channels);
        if spliced.frames().abs_diff(expected) > 1 {
            return Err(SpliceError::LengthMismatch {
                expected,
                actual: spliced.frames(),
            });
        }

        log::debug!(
            "Spliced {} entries into {:.3}s of audio",
            timeline.entries().len(),
            spliced.duration()
        );
        Ok(spliced)
    }

    fn normalize(
        &self,
        segment_id: &str,
        audio: &AudioBuffer,
        target: &AudioBuffer,
    ) -> Result<AudioBuffer, SpliceError> {
        if audio.has_format_of(target) {
            return Ok(audio.clone());
        }
        log::debug!(
            "Resampling segment {segment_id} from {} Hz x{} to {} Hz x{}",
            audio.sample_rate(),
            audio.channels(),
            target.sample_rate(),
            target.channels()
        );
        let converted = self
            .resampler
            .resample(audio, target.sample_rate(), target.channels())
            .map_err(|e| SpliceError::Resample {
                segment_id: segment_id.to_string(),
                message: e.to_string(),
            })?;
        if !converted.has_format_of(target) {
            return Err(SpliceError::FormatMismatch {
                segment_id: segment_id.to_string(),
                rate: target.sample_rate(),
                channels: target.channels(),
                found_rate: converted.sample_rate(),
                found_channels: converted.channels(),
            });
        }
        Ok(converted)
    }
}

/// Appends `frames` exactly `count` frames long, padding with silence.
fn append_fitted(out: &mut Vec<f32>, frames: &[f32], count: usize, channels: u16) {
    let wanted = count * channels as usize;
    let take = frames.len().min(wanted);
    out.extend_from_slice(&frames[..take]);
    out.resize(out.len() + (wanted - take), 0.0);
}
