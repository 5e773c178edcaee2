use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info};

use crate::config::TtsConfig;
use crate::error::CollabError;

/// Writes exactly one narration file for `text` at `output_path`.
#[async_trait]
pub trait SpeechGenerator: Send + Sync {
    /// File extension of the audio this backend produces.
    fn extension(&self) -> &'static str;

    async fn generate_audio(&self, text: &str, output_path: &Path) -> Result<(), CollabError>;
}

/// Local Piper TTS; text goes in on stdin, WAV comes out.
pub struct PiperSpeech {
    model: PathBuf,
}

impl PiperSpeech {
    pub fn new(model: PathBuf) -> Self {
        Self { model }
    }
}

fn run_piper(model: &Path, text: &str, out_path: &Path) -> Result<(), CollabError> {
    let mut child = Command::new("piper")
        .arg("--model")
        .arg(model)
        .arg("--output_file")
        .arg(out_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| CollabError::Generation(format!("failed to spawn piper: {}", e)))?;

    {
        let stdin = child
            .stdin
            .as_mut()
            .ok_or_else(|| CollabError::Generation("failed to open piper stdin".into()))?;
        stdin.write_all(text.as_bytes())?;
    }

    let status = child.wait()?;
    if !status.success() {
        error!("Piper TTS command failed for {}", out_path.display());
        return Err(CollabError::Generation(
            "TTS engine failed, command returned non-zero".into(),
        ));
    }
    Ok(())
}

#[async_trait]
impl SpeechGenerator for PiperSpeech {
    fn extension(&self) -> &'static str {
        "wav"
    }

    async fn generate_audio(&self, text: &str, output_path: &Path) -> Result<(), CollabError> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let model = self.model.clone();
        let text = text.to_string();
        let out = output_path.to_path_buf();
        tokio::task::spawn_blocking(move || run_piper(&model, &text, &out))
            .await
            .map_err(|e| CollabError::Generation(format!("piper task failed: {}", e)))??;
        info!("Piper TTS generated {}", output_path.display());
        Ok(())
    }
}

/// ElevenLabs text-to-speech, MP3 output.
pub struct ElevenLabsSpeech {
    client: Client,
    api_key: Option<String>,
    voice: String,
}

impl ElevenLabsSpeech {
    pub fn new(config: &TtsConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.elevenlabs_api_key.clone(),
            voice: config.elevenlabs_voice.clone(),
        }
    }
}

#[async_trait]
impl SpeechGenerator for ElevenLabsSpeech {
    fn extension(&self) -> &'static str {
        "mp3"
    }

    async fn generate_audio(&self, text: &str, output_path: &Path) -> Result<(), CollabError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CollabError::Generation("no ElevenLabs API key configured".into()))?;
        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}?output_format=mp3_44100_128",
            self.voice
        );
        let res = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .json(&json!({ "text": text, "model_id": "eleven_multilingual_v2" }))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(CollabError::Generation(format!(
                "request failed with status {}: {}",
                status, body
            )));
        }
        let bytes = res.bytes().await?;

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output_path, &bytes).await?;
        info!("ElevenLabs audio written to {}", output_path.display());
        Ok(())
    }
}
