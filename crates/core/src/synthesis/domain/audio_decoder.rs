use crate::audio::domain::audio_buffer::AudioBuffer;

/// Decodes provider audio (e.g. MP3) into PCM.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, encoded: &[u8]) -> Result<AudioBuffer, Box<dyn std::error::Error + Send + Sync>>;
}
