use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use crate::synthesis::domain::speech_provider::{ProviderError, SpeechProvider};
use crate::synthesis::domain::voice_profile::{VoiceProfile, VoiceSettings};

const API_KEY_HEADER: &str = "xi-api-key";

/// A voice offered by the provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl VoiceInfo {
    fn premade(voice_id: &str, name: &str) -> Self {
        Self {
            voice_id: voice_id.to_string(),
            name: name.to_string(),
            category: Some("premade".to_string()),
        }
    }
}

/// Voices every account can use, returned when the voice list is unavailable.
pub fn default_voices() -> Vec<VoiceInfo> {
    vec![
        VoiceInfo::premade("nPczCjzI2devNBz1zQrb", "Rachel"),
        VoiceInfo::premade("AZnzlk1XvdvUeBnXmlld", "Domi"),
        VoiceInfo::premade("EXAVITQu4vr4xnSDxMaL", "Bella"),
        VoiceInfo::premade("ErXwobaYiN019PkySvjV", "Antoni"),
        VoiceInfo::premade("VR6AewLTigWG4xSOukaG", "Arnold"),
    ]
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<VoiceInfo>,
}

/// ElevenLabs text-to-speech over its REST API. Returns MP3 audio.
pub struct ElevenLabsProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ElevenLabsProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Lists the account's voices, falling back to the premade set on any
    /// failure.
    pub async fn list_voices(&self) -> Vec<VoiceInfo> {
        match self.fetch_voices().await {
            Ok(voices) => voices,
            Err(e) => {
                log::warn!("Could not fetch voices ({e}), using defaults");
                default_voices()
            }
        }
    }

    async fn fetch_voices(&self) -> Result<Vec<VoiceInfo>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/voices", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), message, None));
        }
        let body: VoicesResponse = response.json().await.map_err(classify_transport)?;
        Ok(body.voices)
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsProvider {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<Bytes, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Permanent {
                status: None,
                message: "ElevenLabs API key is not configured".to_string(),
            });
        }

        let url = format!("{}/text-to-speech/{}", self.base_url, voice.voice_id);
        let request = SpeechRequest {
            text,
            model_id: &voice.model_id,
            voice_settings: &voice.settings,
        };

        log::debug!("POST {url} ({} chars)", text.chars().count());
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(ACCEPT, "audio/mpeg")
            .json(&request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), message, retry_after));
        }

        response.bytes().await.map_err(classify_transport)
    }
}

/// Timeouts and connection-level failures may succeed on retry; anything
/// else (malformed request, undecodable body) will not.
fn classify_transport(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        ProviderError::Transient {
            message: e.to_string(),
            retry_after: None,
        }
    } else {
        ProviderError::Permanent {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

/// Reads a `Retry-After` header given in whole seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
