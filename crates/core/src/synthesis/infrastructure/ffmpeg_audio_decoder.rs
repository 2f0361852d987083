use std::io::Write;

use crate::audio::domain::audio_buffer::AudioBuffer;
use crate::media::domain::audio_extractor::AudioExtractor;
use crate::media::infrastructure::ffmpeg_audio_extractor::FfmpegAudioExtractor;
use crate::synthesis::domain::audio_decoder::AudioDecoder;

/// Decodes provider audio by staging it in a temporary file for ffmpeg.
pub struct FfmpegAudioDecoder {
    suffix: String,
}

impl FfmpegAudioDecoder {
    /// `extension` tells ffmpeg which demuxer to probe first, e.g. `"mp3"`.
    pub fn new(extension: &str) -> Self {
        Self {
            suffix: format!(".{extension}"),
        }
    }
}

impl Default for FfmpegAudioDecoder {
    fn default() -> Self {
        Self::new("mp3")
    }
}

impl AudioDecoder for FfmpegAudioDecoder {
    fn decode(
        &self,
        encoded: &[u8],
    ) -> Result<AudioBuffer, Box<dyn std::error::Error + Send + Sync>> {
        if encoded.is_empty() {
            return Err("no audio data".into());
        }

        let mut staged = tempfile::Builder::new()
            .prefix("respeak-tts-")
            .suffix(&self.suffix)
            .tempfile()?;
        staged.write_all(encoded)?;
        staged.flush()?;

        FfmpegAudioExtractor
            .extract(staged.path())?
            .ok_or_else(|| "synthesized data contains no audio stream".into())
    }
}
