use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::audio::domain::audio_buffer::AudioBuffer;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VideoHandling {
    /// Video packets copied unchanged.
    StreamCopy,
    /// Video decoded and encoded again with the named codec.
    Reencoded { codec: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemuxOutcome {
    pub video: VideoHandling,
    pub audio_codec: String,
}

#[derive(Error, Debug)]
pub enum RemuxError {
    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),
    #[error("container {path} rejected the streams: {reason}")]
    UnsupportedContainer { path: PathBuf, reason: String },
    #[error("no encoder available for {0}")]
    CodecUnavailable(String),
    #[error("replacement audio is empty or has no channels")]
    EmptyAudio,
    #[error("ffmpeg: {0}")]
    Ffmpeg(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Domain interface for writing a new soundtrack into a copy of a video.
///
/// The source is only read. The output is written elsewhere and appears at
/// `output` only once complete.
pub trait MediaRemuxer: Send + Sync {
    fn remux(
        &self,
        source: &Path,
        audio: &AudioBuffer,
        output: &Path,
    ) -> Result<RemuxOutcome, RemuxError>;
}
