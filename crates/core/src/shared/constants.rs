pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";

/// Premade "Rachel" voice.
pub const DEFAULT_VOICE_ID: &str = "nPczCjzI2devNBz1zQrb";
pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";

/// Provider-side hard limit on a single synthesis request.
pub const MAX_SYNTHESIS_CHARS: usize = 40_000;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 8_000;
pub const DEFAULT_SYNTHESIS_CONCURRENCY: usize = 4;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3_600;
pub const DEFAULT_AUDIO_BITRATE: usize = 192_000;

/// Tolerance for comparing timeline positions, in seconds.
pub const TIME_EPSILON: f64 = 1e-6;

/// Slack allowed when checking segment ends against the media duration.
pub const MEDIA_BOUNDS_TOLERANCE: f64 = 1e-3;
