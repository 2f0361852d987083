use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use respeak_core::audio::domain::audio_splicer::AudioSplicer;
use respeak_core::audio::infrastructure::ffmpeg_resampler::FfmpegResampler;
use respeak_core::media::infrastructure::ffmpeg_audio_extractor::FfmpegAudioExtractor;
use respeak_core::media::infrastructure::ffmpeg_remuxer::FfmpegRemuxer;
use respeak_core::pipeline::apply_edits_use_case::ApplyEditsUseCase;
use respeak_core::pipeline::infrastructure::directory_artifact_store::DirectoryArtifactStore;
use respeak_core::pipeline::infrastructure::json_project_store::JsonProjectStore;
use respeak_core::pipeline::pipeline_logger::{PipelineLogger, StdoutPipelineLogger};
use respeak_core::pipeline::request_context::RequestContext;
use respeak_core::shared::engine_config::{EngineConfig, API_KEY_ENV};
use respeak_core::synthesis::domain::synthesis_gateway::SynthesisGateway;
use respeak_core::synthesis::infrastructure::elevenlabs_provider::ElevenLabsProvider;
use respeak_core::synthesis::infrastructure::ffmpeg_audio_decoder::FfmpegAudioDecoder;
use respeak_core::transcript::domain::text_edit::TextEdit;

/// Re-voice edited transcript segments in a video.
#[derive(Parser)]
#[command(name = "respeak")]
struct Cli {
    /// Config file (default: <config dir>/respeak/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a batch of text edits to a project and render new media.
    Apply {
        /// Directory holding <project>.json documents.
        #[arg(long)]
        projects: PathBuf,

        /// Project id.
        #[arg(long)]
        project: String,

        /// JSON file with the edits: an array, or {"changes": [...]}.
        #[arg(long)]
        edits: PathBuf,

        /// Where rendered media goes (default: <projects>/renders).
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Voice id to synthesize with.
        #[arg(long)]
        voice: Option<String>,

        /// Maximum synthesis requests in flight.
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// List voices available to the configured account.
    Voices,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EditsDocument {
    Bare(Vec<TextEdit>),
    Wrapped { changes: Vec<TextEdit> },
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Apply {
            projects,
            project,
            edits,
            output_dir,
            voice,
            concurrency,
        } => {
            config.apply_overrides(None, voice);
            if let Some(n) = concurrency {
                config.concurrency = n;
            }
            if output_dir.is_some() {
                config.output_dir = output_dir;
            }
            validate(&projects, &edits, &config)?;
            run_apply(&projects, &project, &edits, &config).await
        }
        Command::Voices => run_voices(&config).await,
    }
}

async fn run_apply(
    projects: &Path,
    project_id: &str,
    edits_path: &Path,
    config: &EngineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let edits = read_edits(edits_path)?;
    let output_dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| projects.join("renders"));

    let provider = ElevenLabsProvider::new(&config.base_url, &config.api_key, config.request_timeout())?;
    let gateway = SynthesisGateway::new(
        Arc::new(provider),
        Arc::new(FfmpegAudioDecoder::default()),
        config.gateway_config(),
    );

    let use_case = ApplyEditsUseCase::new(
        Arc::new(JsonProjectStore::new(projects)),
        Arc::new(DirectoryArtifactStore::new(output_dir)),
        Arc::new(gateway),
        Arc::new(FfmpegAudioExtractor),
        Arc::new(AudioSplicer::new(Box::new(FfmpegResampler))),
        Arc::new(FfmpegRemuxer::new(config.audio_bitrate)),
        config.voice.clone(),
    );

    let ctx = RequestContext::new();
    let mut logger = StdoutPipelineLogger::new(&ctx.request_id);
    let result = use_case.execute(&ctx, project_id, &edits, &mut logger).await;
    logger.summary();

    let artifact = result.map_err(|e| format!("{} ({})", e, e.kind()))?;
    if artifact.changed {
        log::info!("Output written to {}", artifact.location.display());
    } else {
        log::info!("No text changed, media is still {}", artifact.location.display());
    }
    println!("{}", serde_json::to_string_pretty(&artifact)?);
    Ok(())
}

async fn run_voices(config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.api_key.is_empty() {
        log::warn!("{API_KEY_ENV} is not set, showing premade voices");
    }
    let provider = ElevenLabsProvider::new(&config.base_url, &config.api_key, config.request_timeout())?;
    for voice in provider.list_voices().await {
        let marker = if voice.voice_id == config.voice.voice_id { "*" } else { " " };
        println!(
            "{marker} {:24} {:20} {}",
            voice.voice_id,
            voice.name,
            voice.category.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn read_edits(path: &Path) -> Result<Vec<TextEdit>, Box<dyn std::error::Error>> {
    let json = fs::read_to_string(path)
        .map_err(|e| format!("Cannot read edits file {}: {e}", path.display()))?;
    parse_edits(&json).map_err(|e| format!("Invalid edits file {}: {e}", path.display()).into())
}

fn parse_edits(json: &str) -> Result<Vec<TextEdit>, serde_json::Error> {
    Ok(match serde_json::from_str(json)? {
        EditsDocument::Bare(edits) => edits,
        EditsDocument::Wrapped { changes } => changes,
    })
}

fn validate(projects: &Path, edits: &Path, config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !projects.is_dir() {
        return Err(format!("Projects directory not found: {}", projects.display()).into());
    }
    if !edits.exists() {
        return Err(format!("Edits file not found: {}", edits.display()).into());
    }
    if config.api_key.is_empty() {
        return Err(format!("No API key: set {API_KEY_ENV} or api_key in the config file").into());
    }
    config.validate()?;
    Ok(())
}
