use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::{
    DEFAULT_AUDIO_BITRATE, DEFAULT_CACHE_TTL_SECS, DEFAULT_INITIAL_BACKOFF_MS,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SYNTHESIS_CONCURRENCY, ELEVENLABS_BASE_URL,
};
use crate::synthesis::domain::synthesis_gateway::GatewayConfig;
use crate::synthesis::domain::voice_profile::VoiceProfile;

pub const API_KEY_ENV: &str = "ELEVENLABS_API_KEY";
pub const VOICE_ID_ENV: &str = "VOICE_ID";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Engine settings, read from a JSON file. Every field is optional in the
/// file; missing ones take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
    pub api_key: String,
    pub voice: VoiceProfile,
    pub request_timeout_secs: u64,
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub concurrency: usize,
    pub cache_ttl_secs: u64,
    /// Where rendered artifacts go. Defaults to `<projects dir>/renders`.
    pub output_dir: Option<PathBuf>,
    pub audio_bitrate: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: ELEVENLABS_BASE_URL.to_string(),
            api_key: String::new(),
            voice: VoiceProfile::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            concurrency: DEFAULT_SYNTHESIS_CONCURRENCY,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            output_dir: None,
            audio_bitrate: DEFAULT_AUDIO_BITRATE,
        }
    }
}

impl EngineConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("respeak").join("config.json"))
    }

    /// Loads `path`, or the default config location when `None`, then applies
    /// environment overrides. A missing file yields the defaults; an
    /// explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => match Self::default_path() {
                Some(path) => match Self::read(&path) {
                    Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
                        Self::default()
                    }
                    other => other?,
                },
                None => Self::default(),
            },
        };
        config.apply_overrides(
            std::env::var(API_KEY_ENV).ok(),
            std::env::var(VOICE_ID_ENV).ok(),
        );
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Blank values are ignored.
    pub fn apply_overrides(&mut self, api_key: Option<String>, voice_id: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.api_key = key;
        }
        if let Some(voice) = voice_id.filter(|v| !v.trim().is_empty()) {
            self.voice.voice_id = voice;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        if self.voice.voice_id.trim().is_empty() {
            return Err(ConfigError::Invalid("voice id must not be empty".into()));
        }
        if self.audio_bitrate == 0 {
            return Err(ConfigError::Invalid("audio_bitrate must be positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            concurrency: self.concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway_config(), GatewayConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "concurrency": 2, "voice": { "voice_id": "abc" } }"#).unwrap();

        let config = EngineConfig::read(&path).unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.voice.voice_id, "abc");
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.base_url, ELEVENLABS_BASE_URL);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ concurrency: ").unwrap();
        assert!(matches!(
            EngineConfig::read(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_overrides_replace_non_blank_values() {
        let mut config = EngineConfig::default();
        config.apply_overrides(Some("secret".into()), Some("voice-2".into()));
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.voice.voice_id, "voice-2");

        config.apply_overrides(Some("  ".into()), None);
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.voice.voice_id, "voice-2");
    }

    #[rstest]
    #[case::zero_concurrency(|c: &mut EngineConfig| c.concurrency = 0)]
    #[case::zero_attempts(|c: &mut EngineConfig| c.max_attempts = 0)]
    #[case::inverted_backoff(|c: &mut EngineConfig| c.initial_backoff_ms = c.max_backoff_ms + 1)]
    #[case::blank_voice(|c: &mut EngineConfig| c.voice.voice_id = " ".into())]
    #[case::zero_bitrate(|c: &mut EngineConfig| c.audio_bitrate = 0)]
    fn test_validate_rejects(#[case] mutate: fn(&mut EngineConfig)) {
        let mut config = EngineConfig::default();
        mutate(&mut config);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
