use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

/// All runtime settings. Built once in `main` and handed to each component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub video: VideoConfig,
    pub subtitles: SubtitleConfig,
    pub retry: RetryConfig,
    pub llm: LlmConfig,
    pub research: ResearchConfig,
    pub image: ImageConfig,
    pub tts: TtsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub base_dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("projects"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub fps: u32,
    pub default_width: u32,
    pub default_height: u32,
    pub zoom_ratio: f64,
    pub initial_zoom: f64,
    pub transition_duration: f64,
    pub music_dir: Option<PathBuf>,
    pub music_volume: f64,
    pub video_codec: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            fps: 24,
            default_width: 1080,
            default_height: 1920,
            zoom_ratio: 0.15,
            initial_zoom: 1.5,
            transition_duration: 1.0,
            music_dir: None,
            music_volume: 0.2,
            video_codec: "libx264".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAnchor {
    Center,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalAnchor {
    Left,
    Center,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    pub font_path: PathBuf,
    pub font_size: u32,
    pub highlight_delta: u32,
    pub margin: u32,
    pub vertical: VerticalAnchor,
    pub horizontal: HorizontalAnchor,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            font_path: PathBuf::from("fonts/Bangers-Regular.ttf"),
            font_size: 64,
            highlight_delta: 10,
            margin: 50,
            vertical: VerticalAnchor::Center,
            horizontal: HorizontalAnchor::Left,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub max_delay: f64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_factor: 1.0,
            max_delay: 60.0,
            jitter: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-2024-08-06".to_string(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub api_key: Option<String>,
    pub max_results: u32,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            max_results: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub api_token: Option<String>,
    pub model: String,
    pub aspect_ratio: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            model: "black-forest-labs/flux-schnell".to_string(),
            aspect_ratio: "9:16".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TtsBackend {
    Piper,
    Elevenlabs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub backend: TtsBackend,
    pub piper_model: PathBuf,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: TtsBackend::Piper,
            piper_model: PathBuf::from("./tts/en_US-hfc_male-medium.onnx"),
            elevenlabs_api_key: None,
            elevenlabs_voice: "JBFqnCBsd6RMkjVDRZzb".to_string(),
        }
    }
}

impl Config {
    /// Reads a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("Config file {} not found; using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Fills unset credentials from the given lookup (the process environment in `main`).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fill(&mut self.llm.api_key, lookup("OPENAI_API_KEY"));
        fill(&mut self.research.api_key, lookup("TAVILY_API_KEY"));
        fill(&mut self.image.api_token, lookup("REPLICATE_API_TOKEN"));
        fill(&mut self.tts.elevenlabs_api_key, lookup("ELEVEN_LABS_API_KEY"));
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value.filter(|v| !v.trim().is_empty());
    }
}
