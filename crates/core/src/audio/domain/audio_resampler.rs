use super::audio_buffer::AudioBuffer;

/// Domain interface for sample-rate and channel-layout conversion.
pub trait AudioResampler: Send + Sync {
    fn resample(
        &self,
        audio: &AudioBuffer,
        sample_rate: u32,
        channels: u16,
    ) -> Result<AudioBuffer, Box<dyn std::error::Error + Send + Sync>>;
}
