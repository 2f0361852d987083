pub mod elevenlabs_provider;
pub mod ffmpeg_audio_decoder;
