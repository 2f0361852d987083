use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::format::Sample;
use ffmpeg_next::util::frame::audio::Audio as AudioFrame;

use crate::audio::domain::audio_buffer::AudioBuffer;
use crate::audio::domain::audio_resampler::AudioResampler;
use crate::media::infrastructure::ffmpeg_audio_extractor::{convert, drain, effective_layout};

/// Frames fed to swresample per call.
const CHUNK_FRAMES: usize = 4096;

/// Sample-rate and channel conversion through libswresample.
pub struct FfmpegResampler;

impl AudioResampler for FfmpegResampler {
    fn resample(
        &self,
        audio: &AudioBuffer,
        sample_rate: u32,
        channels: u16,
    ) -> Result<AudioBuffer, Box<dyn std::error::Error + Send + Sync>> {
        if audio.sample_rate() == sample_rate && audio.channels() == channels {
            return Ok(audio.clone());
        }
        if audio.channels() == 0 || audio.sample_rate() == 0 || channels == 0 || sample_rate == 0 {
            return Err("cannot resample audio with zero channels or sample rate".into());
        }

        ffmpeg_next::init()?;

        let in_layout = effective_layout(ffmpeg_next::ChannelLayout::empty(), audio.channels());
        let out_layout = effective_layout(ffmpeg_next::ChannelLayout::empty(), channels);
        let packed = Sample::F32(SampleType::Packed);

        let mut resampler = ffmpeg_next::software::resampling::Context::get(
            packed,
            in_layout,
            audio.sample_rate(),
            packed,
            out_layout,
            sample_rate,
        )?;

        let in_channels = audio.channels() as usize;
        let mut out: Vec<f32> = Vec::new();

        for chunk in audio.samples().chunks(CHUNK_FRAMES * in_channels) {
            let frames = chunk.len() / in_channels;
            let mut input = AudioFrame::new(packed, frames, in_layout);
            input.set_rate(audio.sample_rate());
            for (slot, sample) in input.data_mut(0).chunks_exact_mut(4).zip(chunk) {
                slot.copy_from_slice(&sample.to_ne_bytes());
            }
            convert(&mut resampler, &input, channels as usize, &mut out)?;
        }
        drain(&mut resampler, channels as usize, &mut out)?;

        Ok(AudioBuffer::new(out, sample_rate, channels))
    }
}
