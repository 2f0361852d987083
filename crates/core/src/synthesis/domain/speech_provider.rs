use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use super::voice_profile::VoiceProfile;

/// Failure reported by a speech provider, classified by whether a retry can
/// succeed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("transient provider failure: {message}")]
    Transient {
        message: String,
        /// Minimum wait requested by the provider before the next attempt.
        retry_after: Option<Duration>,
    },
    #[error("provider rejected the request{}: {message}", status_suffix(.status))]
    Permanent { status: Option<u16>, message: String },
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::Transient { retry_after, .. } => *retry_after,
            ProviderError::Permanent { .. } => None,
        }
    }

    /// Classifies an HTTP error status. 408, 429 and 5xx are transient.
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        if status == 408 || status == 429 || (500..600).contains(&status) {
            ProviderError::Transient {
                message: format!("HTTP {status}: {message}"),
                retry_after,
            }
        } else {
            ProviderError::Permanent {
                status: Some(status),
                message,
            }
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// Domain interface for text-to-speech.
///
/// Implementations return the encoded audio exactly as the provider sent it.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<Bytes, ProviderError>;
}
