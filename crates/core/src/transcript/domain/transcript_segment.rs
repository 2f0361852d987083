use serde::{Deserialize, Serialize};

/// A timed span of transcript text attributed to one speaker.
///
/// Segments are values: edits and timeline reconciliation produce new
/// segments through [`with_text`](Self::with_text) and
/// [`with_span`](Self::with_span) rather than mutating existing ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub id: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default = "default_speaker")]
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

fn default_speaker() -> String {
    "Speaker".to_string()
}

impl TranscriptSegment {
    pub fn new(id: &str, start_time: f64, end_time: f64, text: &str) -> Self {
        Self {
            id: id.to_string(),
            start_time,
            end_time,
            speaker: default_speaker(),
            text: text.to_string(),
            confidence: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn with_text(&self, text: String) -> Self {
        Self {
            text,
            ..self.clone()
        }
    }

    pub fn with_span(&self, start_time: f64, end_time: f64) -> Self {
        Self {
            start_time,
            end_time,
            ..self.clone()
        }
    }
}
