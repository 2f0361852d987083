use serde::{Deserialize, Serialize};

use crate::shared::constants::{DEFAULT_MODEL_ID, DEFAULT_VOICE_ID};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
    pub speed: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
            speed: 1.0,
        }
    }
}

/// Voice, model and tuning used for a synthesis request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceProfile {
    pub voice_id: String,
    pub model_id: String,
    pub settings: VoiceSettings,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            settings: VoiceSettings::default(),
        }
    }
}

impl VoiceProfile {
    pub fn with_voice(voice_id: &str) -> Self {
        Self {
            voice_id: voice_id.to_string(),
            ..Self::default()
        }
    }

    /// Stable identity of the profile for cache lookups. Floats are keyed by
    /// bit pattern.
    pub fn cache_key(&self) -> String {
        let s = &self.settings;
        format!(
            "{}|{}|{:08x}|{:08x}|{:08x}|{}|{:08x}",
            self.voice_id,
            self.model_id,
            s.stability.to_bits(),
            s.similarity_boost.to_bits(),
            s.style.to_bits(),
            s.use_speaker_boost,
            s.speed.to_bits()
        )
    }
}
