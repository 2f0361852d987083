use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};

use super::engine_error::EngineError;
use super::pipeline_logger::PipelineLogger;
use super::project_store::{ArtifactStore, MediaArtifactRef, ProjectSnapshot, ProjectStore, ProjectUpdate};
use super::request_context::RequestContext;
use crate::audio::domain::audio_buffer::AudioBuffer;
use crate::audio::domain::audio_splicer::AudioSplicer;
use crate::editing::domain::edit_plan::EditPlan;
use crate::editing::domain::edit_resolver::EditResolver;
use crate::media::domain::audio_extractor::AudioExtractor;
use crate::media::domain::media_remuxer::MediaRemuxer;
use crate::synthesis::domain::synthesis_gateway::SynthesisGateway;
use crate::synthesis::domain::synthesis_result::SynthesisResult;
use crate::synthesis::domain::voice_profile::VoiceProfile;
use crate::timeline::domain::timeline_reconciler::TimelineReconciler;
use crate::transcript::domain::text_edit::TextEdit;
use crate::transcript::domain::transcript;

const TOTAL_STAGES: usize = 8;

/// Applies a batch of transcript edits to a project's media: resynthesizes
/// edited segments, splices them in, remuxes, and commits the result.
pub struct ApplyEditsUseCase {
    projects: Arc<dyn ProjectStore>,
    artifacts: Arc<dyn ArtifactStore>,
    gateway: Arc<SynthesisGateway>,
    extractor: Arc<dyn AudioExtractor>,
    splicer: Arc<AudioSplicer>,
    remuxer: Arc<dyn MediaRemuxer>,
    voice: VoiceProfile,
}

impl ApplyEditsUseCase {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        artifacts: Arc<dyn ArtifactStore>,
        gateway: Arc<SynthesisGateway>,
        extractor: Arc<dyn AudioExtractor>,
        splicer: Arc<AudioSplicer>,
        remuxer: Arc<dyn MediaRemuxer>,
        voice: VoiceProfile,
    ) -> Self {
        Self {
            projects,
            artifacts,
            gateway,
            extractor,
            splicer,
            remuxer,
            voice,
        }
    }

    /// Runs the whole apply flow. Nothing is committed unless every stage
    /// succeeds; an edit batch that changes no text returns the current media
    /// unchanged without synthesizing or writing anything.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        edits: &[TextEdit],
        logger: &mut dyn PipelineLogger,
    ) -> Result<MediaArtifactRef, EngineError> {
        let rid = ctx.request_id.as_str();
        log::info!("[{rid}] Applying {} edit(s) to project {project_id}", edits.len());

        // 1. Load and validate the stored transcript
        logger.stage(1, TOTAL_STAGES, "load");
        let t0 = Instant::now();
        let snapshot = self.projects.load(project_id).await?;
        transcript::validate(&snapshot.segments, snapshot.media_duration)?;
        logger.timing("load", elapsed_ms(t0));

        // 2. Resolve edits into a plan; rejects bad batches before any network call
        logger.stage(2, TOTAL_STAGES, "resolve");
        let plan = EditResolver::resolve(&snapshot.segments, edits)?;
        logger.metric("segments_edited", plan.len() as f64);

        let fingerprint = fingerprint(&snapshot, &plan, &self.voice);
        if plan.is_empty() {
            logger.info("No text changes, media left untouched");
            return Ok(MediaArtifactRef {
                location: snapshot.media_location,
                fingerprint,
                changed: false,
            });
        }

        // 3. Synthesize every edited segment, all or nothing
        logger.stage(3, TOTAL_STAGES, "synthesize");
        let t0 = Instant::now();
        let results = self.gateway.synthesize_plan(&plan, &self.voice).await?;
        logger.timing("synthesize", elapsed_ms(t0));

        // 4. Decode the original soundtrack
        logger.stage(4, TOTAL_STAGES, "extract");
        let t0 = Instant::now();
        let original = self.original_audio(&snapshot, &results).await?;
        logger.timing("extract", elapsed_ms(t0));

        // 5. Lay out the new timeline
        logger.stage(5, TOTAL_STAGES, "reconcile");
        let revised = plan.apply_to(&snapshot.segments);
        let measured: HashMap<String, f64> = results
            .iter()
            .map(|(id, r)| (id.clone(), r.measured_duration))
            .collect();
        let timeline = TimelineReconciler::reconcile(&revised, original.duration(), &measured)?;
        logger.metric("duration_delta_s", timeline.total_delta());

        // 6. Splice synthesized audio into the original
        logger.stage(6, TOTAL_STAGES, "splice");
        let t0 = Instant::now();
        let splicer = Arc::clone(&self.splicer);
        let (timeline, spliced) = tokio::task::spawn_blocking(move || {
            let spliced = splicer.splice(&original, &timeline, &results);
            (timeline, spliced)
        })
        .await
        .map_err(|e| EngineError::Task(e.to_string()))?;
        let spliced = spliced?;
        logger.timing("splice", elapsed_ms(t0));

        // 7. Remux into a new artifact
        logger.stage(7, TOTAL_STAGES, "remux");
        let t0 = Instant::now();
        let extension = snapshot
            .media_location
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4")
            .to_string();
        let output = self
            .artifacts
            .allocate(project_id, &fingerprint, &extension)
            .await?;
        let outcome = {
            let remuxer = Arc::clone(&self.remuxer);
            let source = snapshot.media_location.clone();
            let target = output.clone();
            tokio::task::spawn_blocking(move || remuxer.remux(&source, &spliced, &target))
                .await
                .map_err(|e| EngineError::Task(e.to_string()))??
        };
        logger.timing("remux", elapsed_ms(t0));
        logger.info(&format!(
            "Wrote {} (video {:?}, audio {})",
            output.display(),
            outcome.video,
            outcome.audio_codec
        ));

        // 8. Commit only once the artifact exists
        logger.stage(8, TOTAL_STAGES, "commit");
        let artifact = MediaArtifactRef {
            location: output,
            fingerprint,
            changed: true,
        };
        let media_duration = timeline.total_duration();
        self.projects
            .commit(
                project_id,
                ProjectUpdate {
                    segments: timeline.into_segments(),
                    media_duration,
                    artifact: artifact.clone(),
                },
            )
            .await?;

        log::info!(
            "[{rid}] Project {project_id} updated: {} segment(s) resynthesized, now {media_duration:.3}s",
            plan.len()
        );
        Ok(artifact)
    }

    /// Decodes the source soundtrack. A source without audio gets silence in
    /// the format of the synthesized speech.
    async fn original_audio(
        &self,
        snapshot: &ProjectSnapshot,
        results: &HashMap<String, SynthesisResult>,
    ) -> Result<AudioBuffer, EngineError> {
        let extractor = Arc::clone(&self.extractor);
        let source: PathBuf = snapshot.media_location.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            extractor.extract(&source).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| EngineError::Task(e.to_string()))?
        .map_err(EngineError::AudioExtraction)?;

        if let Some(audio) = extracted {
            return Ok(audio);
        }

        let (rate, channels) = results
            .values()
            .next()
            .map(|r| (r.audio.sample_rate(), r.audio.channels()))
            .ok_or_else(|| EngineError::AudioExtraction("source has no audio stream".into()))?;
        log::warn!(
            "{} has no audio stream, splicing onto silence",
            snapshot.media_location.display()
        );
        let frames = (snapshot.media_duration * rate as f64).round() as usize;
        Ok(AudioBuffer::silent(frames, rate, channels))
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// SHA-256 over the snapshot, the resolved text changes and the voice, as
/// lowercase hex. Equal inputs give equal fingerprints regardless of the
/// order edits were submitted in.
pub fn fingerprint(snapshot: &ProjectSnapshot, plan: &EditPlan, voice: &VoiceProfile) -> String {
    let mut hasher = Sha256::new();
    // Length-prefixed so adjacent fields cannot run into each other.
    let mut field = |bytes: &[u8]| {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    };

    field(snapshot.media_location.to_string_lossy().as_bytes());
    field(&(snapshot.segments.len() as u64).to_le_bytes());
    for segment in &snapshot.segments {
        field(segment.id.as_bytes());
        field(&segment.start_time.to_bits().to_le_bytes());
        field(&segment.end_time.to_bits().to_le_bytes());
        field(segment.speaker.as_bytes());
        field(segment.text.as_bytes());
    }
    field(&(plan.len() as u64).to_le_bytes());
    for entry in plan.entries() {
        field(entry.segment_id.as_bytes());
        field(entry.new_text.as_bytes());
    }
    field(voice.cache_key().as_bytes());

    format!("{:x}", hasher.finalize())
}
