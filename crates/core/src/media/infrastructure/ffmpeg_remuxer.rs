use std::path::Path;

use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::format::Sample;
use ffmpeg_next::util::frame::audio::Audio as AudioFrame;
use ffmpeg_next::util::frame::video::Video as VideoFrame;
use ffmpeg_next::{codec, encoder, format, media, software, Rational};

use super::ffmpeg_audio_extractor::effective_layout;
use crate::audio::domain::audio_buffer::AudioBuffer;
use crate::media::domain::media_remuxer::{MediaRemuxer, RemuxError, RemuxOutcome, VideoHandling};
use crate::shared::constants::DEFAULT_AUDIO_BITRATE;

impl From<ffmpeg_next::Error> for RemuxError {
    fn from(e: ffmpeg_next::Error) -> Self {
        RemuxError::Ffmpeg(e.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VideoMode {
    Copy,
    Reencode,
}

/// Writes a new soundtrack next to the source video stream using ffmpeg-next.
///
/// Video packets are copied as-is when the output container accepts the
/// codec; otherwise video is re-encoded with the container's default codec.
/// Audio is encoded as AAC, or the container's default audio codec when the
/// container rejects AAC or no AAC encoder is available. Audio is encoded
/// alongside the video packets so the output stays interleaved.
pub struct FfmpegRemuxer {
    audio_bitrate: usize,
}

impl FfmpegRemuxer {
    pub fn new(audio_bitrate: usize) -> Self {
        Self { audio_bitrate }
    }
}

impl Default for FfmpegRemuxer {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIO_BITRATE)
    }
}

impl MediaRemuxer for FfmpegRemuxer {
    fn remux(
        &self,
        source: &Path,
        audio: &AudioBuffer,
        output: &Path,
    ) -> Result<RemuxOutcome, RemuxError> {
        ffmpeg_next::init()?;

        if audio.frames() == 0 || audio.sample_rate() == 0 {
            return Err(RemuxError::EmptyAudio);
        }

        let dir = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let ext = output.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
        let temp = tempfile::Builder::new()
            .prefix(".respeak-")
            .suffix(&format!(".{ext}"))
            .tempfile_in(dir)?;

        let outcome = match write_output(source, audio, temp.path(), VideoMode::Copy, self.audio_bitrate)
        {
            Err(RemuxError::UnsupportedContainer { reason, .. }) => {
                log::warn!("Stream copy rejected ({reason}), re-encoding video");
                write_output(source, audio, temp.path(), VideoMode::Reencode, self.audio_bitrate)?
            }
            other => other?,
        };

        temp.persist(output).map_err(|e| RemuxError::Io(e.error))?;
        log::info!(
            "Wrote {} (video: {:?}, audio: {})",
            output.display(),
            outcome.video,
            outcome.audio_codec
        );
        Ok(outcome)
    }
}

fn write_output(
    source: &Path,
    audio: &AudioBuffer,
    target: &Path,
    mode: VideoMode,
    bitrate: usize,
) -> Result<RemuxOutcome, RemuxError> {
    let mut ictx = format::input(source)?;
    let mut octx = format::output(target)?;

    let global_header = octx.format().flags().contains(format::Flags::GLOBAL_HEADER);

    let (video_src_idx, video_in_tb, video_params, video_rate) = {
        let stream = ictx
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| RemuxError::NoVideoStream(source.to_path_buf()))?;
        (stream.index(), stream.time_base(), stream.parameters(), stream.avg_frame_rate())
    };

    // Video stream: either a packet copy or a full transcode.
    let video_ost_idx;
    let mut transcoder = None;
    let handling = match mode {
        VideoMode::Copy => {
            let mut ost = octx.add_stream(encoder::find(codec::Id::None))?;
            ost.set_parameters(video_params);
            unsafe {
                (*ost.parameters().as_mut_ptr()).codec_tag = 0;
            }
            video_ost_idx = ost.index();
            VideoHandling::StreamCopy
        }
        VideoMode::Reencode => {
            let t = VideoTranscoder::new(&mut octx, target, video_params, video_rate, global_header)?;
            video_ost_idx = t.ost_idx;
            let name = t.codec_name.clone();
            transcoder = Some(t);
            VideoHandling::Reencoded { codec: name }
        }
    };

    let audio_codec = {
        let default = octx.format().codec(target, media::Type::Audio);
        let accepts_aac = container_accepts(&octx, codec::Id::AAC);
        choose_audio_codec(accepts_aac, default, |id| encoder::find(id).is_some())
            .and_then(encoder::find)
            .ok_or_else(|| RemuxError::CodecUnavailable("audio".to_string()))?
    };
    let mut audio_enc = AudioEncoder::new(&mut octx, audio_codec, audio, bitrate, global_header)?;

    if let Err(e) = octx.write_header() {
        return Err(RemuxError::UnsupportedContainer {
            path: target.to_path_buf(),
            reason: e.to_string(),
        });
    }

    let video_out_tb = stream_time_base(&octx, video_ost_idx)?;
    let audio_out_tb = stream_time_base(&octx, audio_enc.ost_idx)?;

    for (stream, mut packet) in ictx.packets() {
        if stream.index() != video_src_idx {
            continue;
        }
        if let Some(ts) = packet.dts().or(packet.pts()) {
            let until = ts as f64 * f64::from(video_in_tb);
            audio_enc.encode_until(audio, until, &mut octx, audio_out_tb)?;
        }
        match transcoder.as_mut() {
            Some(t) => t.push(&packet, &mut octx, video_out_tb)?,
            None => {
                packet.rescale_ts(video_in_tb, video_out_tb);
                packet.set_position(-1);
                packet.set_stream(video_ost_idx);
                packet.write_interleaved(&mut octx)?;
            }
        }
    }
    if let Some(t) = transcoder.as_mut() {
        t.finish(&mut octx, video_out_tb)?;
    }

    audio_enc.finish(audio, &mut octx, audio_out_tb)?;

    octx.write_trailer()?;

    Ok(RemuxOutcome {
        video: handling,
        audio_codec: audio_enc.codec_name,
    })
}

fn stream_time_base(octx: &format::context::Output, index: usize) -> Result<Rational, RemuxError> {
    octx.stream(index)
        .map(|s| s.time_base())
        .ok_or_else(|| RemuxError::Ffmpeg(format!("output stream {index} missing")))
}

/// Asks the muxer whether it can store `id`. An unknown answer counts as yes.
fn container_accepts(octx: &format::context::Output, id: codec::Id) -> bool {
    let answer = unsafe { ffmpeg_next::ffi::avformat_query_codec(octx.format().as_ptr(), id.into(), 0) };
    answer != 0
}

/// AAC when the container takes it and an encoder exists, otherwise the
/// container's default audio codec.
fn choose_audio_codec(
    accepts_aac: bool,
    container_default: codec::Id,
    has_encoder: impl Fn(codec::Id) -> bool,
) -> Option<codec::Id> {
    let aac = accepts_aac.then_some(codec::Id::AAC);
    aac.into_iter()
        .chain(std::iter::once(container_default))
        .filter(|id| *id != codec::Id::None)
        .find(|id| has_encoder(*id))
}

/// Encodes an interleaved f32 buffer with whatever sample format the chosen
/// encoder wants, converting through swresample. Audio is consumed in
/// encoder-sized frames from a cursor so it can be fed in step with video.
struct AudioEncoder {
    encoder: encoder::audio::Encoder,
    resampler: software::resampling::Context,
    layout: ffmpeg_next::ChannelLayout,
    ost_idx: usize,
    codec_name: String,
    frame_size: usize,
    next_frame: usize,
}

impl AudioEncoder {
    fn new(
        octx: &mut format::context::Output,
        audio_codec: ffmpeg_next::Codec,
        audio: &AudioBuffer,
        bitrate: usize,
        global_header: bool,
    ) -> Result<Self, RemuxError> {
        let enc_format = audio_codec
            .audio()
            .ok()
            .and_then(|a| a.formats())
            .and_then(|mut formats| formats.next())
            .unwrap_or(Sample::F32(SampleType::Planar));
        let layout = effective_layout(ffmpeg_next::ChannelLayout::empty(), audio.channels());

        let mut ost = octx.add_stream(Some(audio_codec))?;
        let ost_idx = ost.index();

        let mut ctx = codec::context::Context::new_with_codec(audio_codec)
            .encoder()
            .audio()?;
        ctx.set_rate(audio.sample_rate() as i32);
        ctx.set_channel_layout(layout);
        ctx.set_format(enc_format);
        ctx.set_bit_rate(bitrate);
        ctx.set_time_base(Rational(1, audio.sample_rate() as i32));
        if global_header {
            ctx.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let encoder = ctx.open_as(audio_codec)?;
        ost.set_parameters(&encoder);

        let resampler = software::resampling::Context::get(
            Sample::F32(SampleType::Packed),
            layout,
            audio.sample_rate(),
            enc_format,
            layout,
            audio.sample_rate(),
        )?;

        let frame_size = match encoder.frame_size() as usize {
            0 => 1024,
            n => n,
        };

        Ok(Self {
            encoder,
            resampler,
            layout,
            ost_idx,
            codec_name: audio_codec.name().to_string(),
            frame_size,
            next_frame: 0,
        })
    }

    /// Encodes whole encoder frames until the cursor reaches `until` seconds
    /// or the end of the buffer.
    fn encode_until(
        &mut self,
        audio: &AudioBuffer,
        until: f64,
        octx: &mut format::context::Output,
        ost_tb: Rational,
    ) -> Result<(), RemuxError> {
        let channels = audio.channels() as usize;
        let limit = audio.frame_at_time(until).min(audio.frames());
        let enc_tb = self.encoder.time_base();

        while self.next_frame < limit {
            let end = (self.next_frame + self.frame_size).min(audio.frames());
            let chunk = &audio.samples()[self.next_frame * channels..end * channels];
            let mut packed =
                AudioFrame::new(Sample::F32(SampleType::Packed), end - self.next_frame, self.layout);
            packed.set_rate(audio.sample_rate());
            for (slot, sample) in packed.data_mut(0).chunks_exact_mut(4).zip(chunk) {
                slot.copy_from_slice(&sample.to_ne_bytes());
            }

            // Rate is unchanged, so swresample emits exactly the input count.
            let mut converted = AudioFrame::empty();
            self.resampler.run(&packed, &mut converted)?;
            converted.set_pts(Some(self.next_frame as i64));
            self.encoder.send_frame(&converted)?;
            self.drain(octx, enc_tb, ost_tb)?;
            self.next_frame = end;
        }
        Ok(())
    }

    fn finish(
        &mut self,
        audio: &AudioBuffer,
        octx: &mut format::context::Output,
        ost_tb: Rational,
    ) -> Result<(), RemuxError> {
        self.encode_until(audio, audio.duration(), octx, ost_tb)?;
        self.encoder.send_eof()?;
        let enc_tb = self.encoder.time_base();
        self.drain(octx, enc_tb, ost_tb)
    }

    fn drain(
        &mut self,
        octx: &mut format::context::Output,
        enc_tb: Rational,
        ost_tb: Rational,
    ) -> Result<(), RemuxError> {
        let mut encoded = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(self.ost_idx);
            encoded.rescale_ts(enc_tb, ost_tb);
            encoded.write_interleaved(octx)?;
        }
        Ok(())
    }
}

/// Decodes source video and encodes it with the output container's default
/// codec. Frames are renumbered at the source's average frame rate.
struct VideoTranscoder {
    decoder: codec::decoder::Video,
    encoder: encoder::video::Encoder,
    scaler: software::scaling::Context,
    ost_idx: usize,
    enc_tb: Rational,
    next_pts: i64,
    codec_name: String,
}

impl VideoTranscoder {
    fn new(
        octx: &mut format::context::Output,
        target: &Path,
        params: codec::Parameters,
        rate: Rational,
        global_header: bool,
    ) -> Result<Self, RemuxError> {
        let decoder = codec::context::Context::from_parameters(params)?
            .decoder()
            .video()?;

        let video_codec = encoder::find(octx.format().codec(target, media::Type::Video))
            .or_else(|| encoder::find(codec::Id::MPEG4))
            .ok_or_else(|| RemuxError::CodecUnavailable("video".to_string()))?;

        let fps = if rate.numerator() > 0 && rate.denominator() > 0 {
            rate
        } else {
            Rational(30, 1)
        };

        let mut ost = octx.add_stream(Some(video_codec))?;
        let ost_idx = ost.index();

        let mut ctx = codec::context::Context::new_with_codec(video_codec)
            .encoder()
            .video()?;
        ctx.set_width(decoder.width());
        ctx.set_height(decoder.height());
        ctx.set_format(format::Pixel::YUV420P);
        ctx.set_time_base(fps.invert());
        ctx.set_frame_rate(Some(fps));
        if global_header {
            ctx.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        let encoder = ctx.open_with(ffmpeg_next::Dictionary::new())?;
        ost.set_parameters(&encoder);

        let scaler = software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            format::Pixel::YUV420P,
            decoder.width(),
            decoder.height(),
            software::scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            decoder,
            encoder,
            scaler,
            ost_idx,
            enc_tb: fps.invert(),
            next_pts: 0,
            codec_name: video_codec.name().to_string(),
        })
    }

    fn push(
        &mut self,
        packet: &ffmpeg_next::Packet,
        octx: &mut format::context::Output,
        ost_tb: Rational,
    ) -> Result<(), RemuxError> {
        self.decoder.send_packet(packet)?;
        self.encode_decoded(octx, ost_tb)
    }

    fn finish(&mut self, octx: &mut format::context::Output, ost_tb: Rational) -> Result<(), RemuxError> {
        self.decoder.send_eof()?;
        self.encode_decoded(octx, ost_tb)?;
        self.encoder.send_eof()?;
        self.drain(octx, ost_tb)
    }

    fn encode_decoded(
        &mut self,
        octx: &mut format::context::Output,
        ost_tb: Rational,
    ) -> Result<(), RemuxError> {
        let mut decoded = VideoFrame::empty();
        let mut yuv = VideoFrame::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            self.scaler.run(&decoded, &mut yuv)?;
            yuv.set_pts(Some(self.next_pts));
            self.next_pts += 1;
            self.encoder.send_frame(&yuv)?;
            self.drain(octx, ost_tb)?;
        }
        Ok(())
    }

    fn drain(&mut self, octx: &mut format::context::Output, ost_tb: Rational) -> Result<(), RemuxError> {
        let mut encoded = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(self.ost_idx);
            encoded.rescale_ts(self.enc_tb, ost_tb);
            encoded.write_interleaved(octx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Writes a grey MPEG-4 video of `seconds` length with no audio.
    fn write_video(path: &Path, seconds: i64, fps: i32) {
        ffmpeg_next::init().unwrap();
        let mut octx = format::output(path).unwrap();
        let global_header = octx.format().flags().contains(format::Flags::GLOBAL_HEADER);
        let video_codec = encoder::find(codec::Id::MPEG4).unwrap();

        let mut ctx = codec::context::Context::new_with_codec(video_codec)
            .encoder()
            .video()
            .unwrap();
        ctx.set_width(64);
        ctx.set_height(64);
        ctx.set_format(format::Pixel::YUV420P);
        ctx.set_time_base(Rational(1, fps));
        ctx.set_frame_rate(Some(Rational(fps, 1)));
        if global_header {
            ctx.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        let mut enc = ctx.open_with(ffmpeg_next::Dictionary::new()).unwrap();
        let ost_idx = {
            let mut ost = octx.add_stream(Some(video_codec)).unwrap();
            ost.set_parameters(&enc);
            ost.index()
        };
        octx.write_header().unwrap();
        let ost_tb = octx.stream(ost_idx).unwrap().time_base();

        let write_pending = |enc: &mut encoder::video::Encoder, octx: &mut format::context::Output| {
            let mut packet = ffmpeg_next::Packet::empty();
            while enc.receive_packet(&mut packet).is_ok() {
                packet.set_stream(ost_idx);
                packet.rescale_ts(Rational(1, fps), ost_tb);
                packet.write_interleaved(octx).unwrap();
            }
        };

        let mut frame = VideoFrame::new(format::Pixel::YUV420P, 64, 64);
        for plane in 0..3 {
            frame.data_mut(plane).fill(128);
        }
        for i in 0..seconds * i64::from(fps) {
            frame.set_pts(Some(i));
            enc.send_frame(&frame).unwrap();
            write_pending(&mut enc, &mut octx);
        }
        enc.send_eof().unwrap();
        write_pending(&mut enc, &mut octx);
        octx.write_trailer().unwrap();
    }

    #[rstest]
    #[case::mp4_takes_aac(true, codec::Id::AAC, &[codec::Id::AAC], Some(codec::Id::AAC))]
    #[case::webm_rejects_aac(false, codec::Id::OPUS, &[codec::Id::AAC, codec::Id::OPUS], Some(codec::Id::OPUS))]
    #[case::no_aac_encoder(true, codec::Id::MP3, &[codec::Id::MP3], Some(codec::Id::MP3))]
    #[case::nothing_available(false, codec::Id::VORBIS, &[codec::Id::AAC], None)]
    #[case::no_default(false, codec::Id::None, &[codec::Id::AAC], None)]
    fn test_choose_audio_codec(
        #[case] accepts_aac: bool,
        #[case] container_default: codec::Id,
        #[case] encoders: &[codec::Id],
        #[case] expected: Option<codec::Id>,
    ) {
        let chosen = choose_audio_codec(accepts_aac, container_default, |id| encoders.contains(&id));
        assert_eq!(chosen, expected);
    }

    #[test]
    fn test_audio_is_interleaved_with_video() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.mkv");
        let output = dir.path().join("out.mkv");
        write_video(&source, 16, 2);

        let audio = AudioBuffer::silent(16 * 8000, 8000, 1);
        let outcome = FfmpegRemuxer::default().remux(&source, &audio, &output).unwrap();
        assert_eq!(outcome.video, VideoHandling::StreamCopy);

        let mut ictx = format::input(&output).unwrap();
        assert_eq!(ictx.streams().count(), 2);
        let mut latest = f64::MIN;
        let mut audio_packets = 0;
        for (stream, packet) in ictx.packets() {
            let Some(ts) = packet.dts().or(packet.pts()) else {
                continue;
            };
            let t = ts as f64 * f64::from(stream.time_base());
            assert!(
                latest - t < 1.0,
                "packet at {t:.2}s written after one at {latest:.2}s"
            );
            latest = latest.max(t);
            if stream.parameters().medium() == media::Type::Audio {
                audio_packets += 1;
            }
        }
        assert!(audio_packets > 0);
    }

    #[test]
    fn test_remux_nonexistent_source() {
        let dir = tempfile::tempdir().unwrap();
        let audio = AudioBuffer::silent(16000, 16000, 1);
        let source = dir.path().join("missing.mp4");
        let output = dir.path().join("out.mp4");
        let result = FfmpegRemuxer::default().remux(&source, &audio, &output);
        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_remux_rejects_empty_audio() {
        let dir = tempfile::tempdir().unwrap();
        let audio = AudioBuffer::new(vec![], 48000, 2);
        let result = FfmpegRemuxer::default().remux(
            &dir.path().join("in.mp4"),
            &audio,
            &dir.path().join("out.mp4"),
        );
        assert!(matches!(result, Err(RemuxError::EmptyAudio)));
    }

    #[test]
    fn test_failed_remux_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.mp4");
        std::fs::write(&source, b"not a video").unwrap();
        let audio = AudioBuffer::silent(100, 8000, 1);
        let _ = FfmpegRemuxer::default().remux(&source, &audio, &dir.path().join("out.mp4"));
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("in.mp4")]);
    }
}
