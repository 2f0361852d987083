use thiserror::Error;

use super::project_store::StorageError;
use crate::audio::domain::audio_splicer::SpliceError;
use crate::editing::domain::edit_resolver::EditError;
use crate::media::domain::media_remuxer::RemuxError;
use crate::synthesis::domain::synthesis_result::SynthesisError;
use crate::timeline::domain::reconciled_timeline::ReconciliationError;
use crate::transcript::domain::transcript::InvalidTranscript;

/// Every way an apply run can fail, one variant per stage.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("stored transcript is invalid: {0}")]
    Transcript(#[from] InvalidTranscript),
    #[error("edits rejected: {0}")]
    Validation(#[from] EditError),
    #[error("speech synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("timeline reconciliation failed: {0}")]
    Reconciliation(#[from] ReconciliationError),
    #[error("audio splice failed: {0}")]
    Splice(#[from] SpliceError),
    #[error("synthesis succeeded, packaging failed: {0}")]
    Remux(#[from] RemuxError),
    #[error("could not read source audio: {0}")]
    AudioExtraction(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("background task failed: {0}")]
    Task(String),
}

impl EngineError {
    /// Stable machine-readable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Transcript(_) => "invalid_transcript",
            EngineError::Validation(_) => "validation",
            EngineError::Synthesis(_) => "synthesis",
            EngineError::Reconciliation(_) => "reconciliation",
            EngineError::Splice(_) => "splice",
            EngineError::Remux(_) => "remux",
            EngineError::AudioExtraction(_) => "audio_extraction",
            EngineError::Storage(_) => "storage",
            EngineError::Task(_) => "task",
        }
    }

    /// True for failures caused by the request itself rather than by the
    /// engine or its collaborators.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::Synthesis(SynthesisError::InvalidText { .. })
        )
    }
}
