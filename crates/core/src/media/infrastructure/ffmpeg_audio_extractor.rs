use std::path::Path;

use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::format::Sample;
use ffmpeg_next::software::resampling::Context as Resampler;
use ffmpeg_next::util::frame::audio::Audio as AudioFrame;

use crate::audio::domain::audio_buffer::AudioBuffer;
use crate::media::domain::audio_extractor::{AudioExtractor, MediaProbe};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Decodes the best audio stream of a file using ffmpeg-next, keeping its
/// native sample rate and channel count.
pub struct FfmpegAudioExtractor;

impl AudioExtractor for FfmpegAudioExtractor {
    fn extract(&self, path: &Path) -> Result<Option<AudioBuffer>, BoxError> {
        ffmpeg_next::init()?;

        let mut ictx = ffmpeg_next::format::input(path)?;

        let (stream_index, parameters) = match ictx.streams().best(ffmpeg_next::media::Type::Audio)
        {
            Some(stream) => (stream.index(), stream.parameters()),
            None => return Ok(None),
        };

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(parameters)?;
        let mut decoder = codec_ctx.decoder().audio()?;

        let sample_rate = decoder.rate();
        let channels = decoder.channels() as u16;
        if sample_rate == 0 || channels == 0 {
            return Err(format!("audio stream in {} has no usable format", path.display()).into());
        }
        let layout = effective_layout(decoder.channel_layout(), channels);

        let mut resampler = Resampler::get(
            decoder.format(),
            layout,
            sample_rate,
            Sample::F32(SampleType::Packed),
            layout,
            sample_rate,
        )?;

        let mut samples: Vec<f32> = Vec::new();
        let mut decoded = AudioFrame::empty();

        for (stream, packet) in ictx.packets() {
            if stream.index() != stream_index {
                continue;
            }
            decoder.send_packet(&packet)?;
            while decoder.receive_frame(&mut decoded).is_ok() {
                if decoded.channel_layout().is_empty() {
                    decoded.set_channel_layout(layout);
                }
                convert(&mut resampler, &decoded, channels as usize, &mut samples)?;
            }
        }

        decoder.send_eof()?;
        while decoder.receive_frame(&mut decoded).is_ok() {
            if decoded.channel_layout().is_empty() {
                decoded.set_channel_layout(layout);
            }
            convert(&mut resampler, &decoded, channels as usize, &mut samples)?;
        }
        drain(&mut resampler, channels as usize, &mut samples)?;

        log::debug!(
            "Decoded {} frames at {sample_rate} Hz x{channels} from {}",
            samples.len() / channels as usize,
            path.display()
        );
        Ok(Some(AudioBuffer::new(samples, sample_rate, channels)))
    }

    fn probe(&self, path: &Path) -> Result<MediaProbe, BoxError> {
        ffmpeg_next::init()?;

        let ictx = ffmpeg_next::format::input(path)?;

        let duration = if ictx.duration() > 0 {
            ictx.duration() as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE)
        } else {
            0.0
        };
        let has_video = ictx.streams().best(ffmpeg_next::media::Type::Video).is_some();

        let audio_format = match ictx.streams().best(ffmpeg_next::media::Type::Audio) {
            Some(stream) => {
                let codec_ctx =
                    ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
                let decoder = codec_ctx.decoder().audio()?;
                Some((decoder.rate(), decoder.channels() as u16))
            }
            None => None,
        };

        Ok(MediaProbe {
            duration,
            has_video,
            audio_format,
        })
    }
}

/// Some decoders leave the layout unset; fall back to the default layout for
/// the channel count.
pub(crate) fn effective_layout(
    layout: ffmpeg_next::ChannelLayout,
    channels: u16,
) -> ffmpeg_next::ChannelLayout {
    if layout.is_empty() {
        ffmpeg_next::ChannelLayout::default(i32::from(channels))
    } else {
        layout
    }
}

/// Output frames reserved beyond the rate-scaled input.
const OUTPUT_HEADROOM: usize = 256;

/// Allocates an output frame large enough for everything swresample can
/// emit for `input_frames` more input, including its buffered delay.
fn output_frame(resampler: &Resampler, input_frames: usize) -> AudioFrame {
    let input = resampler.input();
    let output = resampler.output();
    let scaled = (input_frames as u64 * u64::from(output.rate)).div_ceil(u64::from(input.rate.max(1)));
    let delay = resampler
        .delay()
        .map_or(0, |d| usize::try_from(d.output).unwrap_or(0));
    let mut frame = AudioFrame::new(
        output.format,
        scaled as usize + delay + OUTPUT_HEADROOM,
        output.channel_layout,
    );
    frame.set_rate(output.rate);
    frame
}

/// Converts one input frame and appends the packed f32 result.
///
/// A fresh output frame is used per call: swresample shrinks `nb_samples`
/// to what it wrote, and a reused frame would cap later conversions.
pub(crate) fn convert(
    resampler: &mut Resampler,
    input: &AudioFrame,
    channels: usize,
    out: &mut Vec<f32>,
) -> Result<(), ffmpeg_next::Error> {
    let mut converted = output_frame(resampler, input.samples());
    resampler.run(input, &mut converted)?;
    append_packed(&converted, channels, out);
    Ok(())
}

/// Flushes the samples swresample still buffers.
pub(crate) fn drain(
    resampler: &mut Resampler,
    channels: usize,
    out: &mut Vec<f32>,
) -> Result<(), ffmpeg_next::Error> {
    loop {
        let mut tail = output_frame(resampler, 0);
        resampler.flush(&mut tail)?;
        if tail.samples() == 0 {
            return Ok(());
        }
        append_packed(&tail, channels, out);
    }
}

/// Appends the interleaved f32 samples of a packed frame.
pub(crate) fn append_packed(frame: &AudioFrame, channels: usize, out: &mut Vec<f32>) {
    let count = frame.samples() * channels;
    if count == 0 {
        return;
    }
    let bytes = &frame.data(0)[..count * 4];
    out.extend(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonexistent() -> &'static Path {
        if cfg!(windows) {
            Path::new("Z:\\nonexistent\\file.mp4")
        } else {
            Path::new("/nonexistent/file.mp4")
        }
    }

    #[test]
    fn test_extract_nonexistent_file() {
        assert!(FfmpegAudioExtractor.extract(nonexistent()).is_err());
    }

    #[test]
    fn test_probe_nonexistent_file() {
        assert!(FfmpegAudioExtractor.probe(nonexistent()).is_err());
    }

    #[test]
    fn test_extract_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.mp4");
        std::fs::write(&path, b"definitely not a media file").unwrap();
        assert!(FfmpegAudioExtractor.extract(&path).is_err());
    }

    /// 16-bit PCM WAV with a constant mono signal.
    fn write_wav(path: &Path, rate: u32, frames: usize) {
        let data_len = (frames * 2) as u32;
        let mut bytes = Vec::with_capacity(44 + frames * 2);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for _ in 0..frames {
            bytes.extend_from_slice(&8192i16.to_le_bytes());
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_extract_wav_keeps_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 22050, 50_000);

        let audio = FfmpegAudioExtractor.extract(&path).unwrap().unwrap();
        assert_eq!(audio.sample_rate(), 22050);
        assert_eq!(audio.channels(), 1);
        assert_eq!(audio.frames(), 50_000);
        assert!((audio.samples()[49_999] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_convert_handles_frame_larger_than_first() {
        ffmpeg_next::init().unwrap();
        let layout = ffmpeg_next::ChannelLayout::MONO;
        let s16 = Sample::I16(SampleType::Packed);
        let mut resampler =
            Resampler::get(s16, layout, 48000, Sample::F32(SampleType::Packed), layout, 48000)
                .unwrap();

        let frame = |frames: usize| {
            let mut f = AudioFrame::new(s16, frames, layout);
            f.set_rate(48000);
            for slot in f.data_mut(0).chunks_exact_mut(2) {
                slot.copy_from_slice(&16384i16.to_ne_bytes());
            }
            f
        };

        let mut out = Vec::new();
        convert(&mut resampler, &frame(100), 1, &mut out).unwrap();
        convert(&mut resampler, &frame(4000), 1, &mut out).unwrap();
        drain(&mut resampler, 1, &mut out).unwrap();
        assert_eq!(out.len(), 4100);
        assert!((out[4099] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_effective_layout_fills_in_default() {
        let layout = effective_layout(ffmpeg_next::ChannelLayout::empty(), 2);
        assert_eq!(layout, ffmpeg_next::ChannelLayout::STEREO);
        let mono = ffmpeg_next::ChannelLayout::MONO;
        assert_eq!(effective_layout(mono, 1), mono);
    }
}
