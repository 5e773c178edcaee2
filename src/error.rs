use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("scene narration is empty")]
    EmptyNarration,

    #[error("scene duration must be positive, got {0}")]
    NonPositiveDuration(f64),

    #[error("scene {index} starts at {actual:.3}s, expected {expected:.3}s")]
    Discontinuous {
        index: usize,
        expected: f64,
        actual: f64,
    },
}

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("no active project workspace")]
    NoWorkspace,

    #[error("invalid file category: {0}")]
    InvalidCategory(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ProjectError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures reported by the external generation services.
#[derive(Error, Debug)]
pub enum CollabError {
    #[error("research failed: {0}")]
    Research(String),

    #[error("structured output could not be parsed: {0}")]
    Parse(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("no scenes survived processing; nothing to render")]
    NoScenes,

    #[error("invalid scene: {0}")]
    InvalidScene(String),

    #[error("no music files found in {0}")]
    NoMusic(PathBuf),

    #[error("audio file not found: {0}")]
    AudioMissing(PathBuf),

    #[error("could not read audio {path}: {reason}")]
    AudioUnreadable { path: PathBuf, reason: String },

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("subtitle error: {0}")]
    Subtitle(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Collab(#[from] CollabError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error("invalid video metadata: {0}")]
    Metadata(String),

    #[error("scene generation returned no scenes")]
    EmptyScript,

    #[error("background task failed: {0}")]
    Join(String),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
