pub mod ffmpeg_resampler;
