use bytes::Bytes;
use thiserror::Error;

use super::speech_provider::ProviderError;
use crate::audio::domain::audio_buffer::AudioBuffer;

/// New audio for one edited segment.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisResult {
    pub segment_id: String,
    /// Encoded audio as returned by the provider.
    pub audio_bytes: Bytes,
    pub audio: AudioBuffer,
    pub measured_duration: f64,
    pub source_text: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("segment {segment_id}: cannot synthesize text: {reason}")]
    InvalidText { segment_id: String, reason: String },
    #[error("segment {segment_id}: {source}")]
    Permanent {
        segment_id: String,
        source: ProviderError,
    },
    #[error("segment {segment_id}: synthesis failed after {attempts} attempts: {last_error}")]
    SynthesisFailed {
        segment_id: String,
        attempts: usize,
        last_error: ProviderError,
    },
    #[error("segment {segment_id}: could not decode synthesized audio: {message}")]
    Decode { segment_id: String, message: String },
}

impl SynthesisError {
    pub fn segment_id(&self) -> &str {
        match self {
            SynthesisError::InvalidText { segment_id, .. }
            | SynthesisError::Permanent { segment_id, .. }
            | SynthesisError::SynthesisFailed { segment_id, .. }
            | SynthesisError::Decode { segment_id, .. } => segment_id,
        }
    }
}
