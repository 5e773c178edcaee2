use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shortsmith::config::{Config, TtsBackend};
use shortsmith::image_gen::ReplicateImages;
use shortsmith::llm::{ChatClient, OpenAiStructured};
use shortsmith::pipeline::{Collaborators, Pipeline};
use shortsmith::research::TavilyResearcher;
use shortsmith::retry::RetryPolicy;
use shortsmith::tts::{ElevenLabsSpeech, PiperSpeech, SpeechGenerator};
use shortsmith::video::FfmpegAssembler;

mod args;

use args::Args;

fn speech_backend(config: &Config) -> Arc<dyn SpeechGenerator> {
    match config.tts.backend {
        TtsBackend::Piper => Arc::new(PiperSpeech::new(config.tts.piper_model.clone())),
        TtsBackend::Elevenlabs => Arc::new(ElevenLabsSpeech::new(&config.tts)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting short video pipeline for '{}'", args.topic);

    let mut config = Config::load(&args.config)?;
    config.apply_env(|key| std::env::var(key).ok());
    args.apply(&mut config);

    let chat = ChatClient::new(config.llm.clone())?;
    let collab = Collaborators {
        researcher: Arc::new(TavilyResearcher::new(config.research.clone(), chat.clone())),
        structured: Arc::new(OpenAiStructured::new(chat)),
        images: Arc::new(ReplicateImages::new(config.image.clone())?),
        speech: speech_backend(&config),
    };
    let assembler = Arc::new(FfmpegAssembler::new(
        config.video.clone(),
        config.subtitles.clone(),
    ));

    let pipeline = Pipeline::new(
        config.project.base_dir.clone(),
        RetryPolicy::from(&config.retry),
        collab,
        assembler,
    )
    .with_transition_duration(config.video.transition_duration);

    match pipeline.run_with_retry(&args.topic).await {
        Ok(video) => {
            info!("Video path: {}", video.file_path.display());
            info!("Title: {}", video.title);
            info!("Description: {}", video.description);
            info!("Keywords: {}", video.keywords.join(", "));
            Ok(())
        }
        Err(e) => {
            error!("Pipeline failed for '{}': {}", args.topic, e);
            Err(e.into())
        }
    }
}
