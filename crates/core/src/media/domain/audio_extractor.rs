use std::path::Path;

use crate::audio::domain::audio_buffer::AudioBuffer;

/// Stream summary of a media file.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaProbe {
    pub duration: f64,
    pub has_video: bool,
    /// `(sample_rate, channels)` of the best audio stream, if any.
    pub audio_format: Option<(u32, u16)>,
}

impl MediaProbe {
    pub fn has_audio(&self) -> bool {
        self.audio_format.is_some()
    }
}

/// Domain interface for reading the soundtrack of a media file.
///
/// Implementations decode at the stream's native rate and channel count.
pub trait AudioExtractor: Send + Sync {
    /// Returns `None` when the file has no audio stream.
    fn extract(
        &self,
        path: &Path,
    ) -> Result<Option<AudioBuffer>, Box<dyn std::error::Error + Send + Sync>>;

    fn probe(&self, path: &Path) -> Result<MediaProbe, Box<dyn std::error::Error + Send + Sync>>;
}
