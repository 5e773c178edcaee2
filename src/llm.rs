use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::error::CollabError;
use crate::scene::{SceneDraft, VideoMetadata};

/// The structured responses the pipeline asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    SceneList,
    Metadata,
    ImagePrompt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StructuredOutput {
    SceneList(Vec<SceneDraft>),
    Metadata(VideoMetadata),
    ImagePrompt(String),
}

impl StructuredOutput {
    pub fn schema(&self) -> Schema {
        match self {
            StructuredOutput::SceneList(_) => Schema::SceneList,
            StructuredOutput::Metadata(_) => Schema::Metadata,
            StructuredOutput::ImagePrompt(_) => Schema::ImagePrompt,
        }
    }

    fn mismatch(&self, want: Schema) -> CollabError {
        CollabError::Parse(format!("expected {:?}, got {:?}", want, self.schema()))
    }

    pub fn into_scenes(self) -> Result<Vec<SceneDraft>, CollabError> {
        match self {
            StructuredOutput::SceneList(scenes) => Ok(scenes),
            other => Err(other.mismatch(Schema::SceneList)),
        }
    }

    pub fn into_metadata(self) -> Result<VideoMetadata, CollabError> {
        match self {
            StructuredOutput::Metadata(meta) => Ok(meta),
            other => Err(other.mismatch(Schema::Metadata)),
        }
    }

    pub fn into_image_prompt(self) -> Result<String, CollabError> {
        match self {
            StructuredOutput::ImagePrompt(prompt) => Ok(prompt),
            other => Err(other.mismatch(Schema::ImagePrompt)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SceneListRecord {
    scenes: Vec<SceneDraft>,
}

#[derive(Debug, Deserialize)]
struct ImagePromptRecord {
    image_prompt: String,
}

/// Removes a surrounding markdown code fence, if the model added one.
fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses a model reply against `schema`.
pub fn parse_structured(schema: Schema, raw: &str) -> Result<StructuredOutput, CollabError> {
    let body = strip_fence(raw);
    let parse_err = |e: serde_json::Error| CollabError::Parse(format!("{:?}: {}", schema, e));
    match schema {
        Schema::SceneList => {
            let record: SceneListRecord = serde_json::from_str(body).map_err(parse_err)?;
            Ok(StructuredOutput::SceneList(record.scenes))
        }
        Schema::Metadata => {
            let record: VideoMetadata = serde_json::from_str(body).map_err(parse_err)?;
            Ok(StructuredOutput::Metadata(record))
        }
        Schema::ImagePrompt => {
            let record: ImagePromptRecord = serde_json::from_str(body).map_err(parse_err)?;
            if record.image_prompt.trim().is_empty() {
                return Err(CollabError::Parse("empty image prompt".into()));
            }
            Ok(StructuredOutput::ImagePrompt(record.image_prompt))
        }
    }
}

#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, schema: Schema) -> Result<StructuredOutput, CollabError>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Minimal client for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Result<Self, CollabError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub async fn complete(
        &self,
        system: Option<&str>,
        user: &str,
        json_mode: bool,
    ) -> Result<String, CollabError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| CollabError::Generation("no LLM API key configured".into()))?;

        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": user }));

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
        });
        if json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        debug!("POST {} (model {})", url, self.config.model);
        let response: ChatResponse = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CollabError::Generation("model returned no content".into()))
    }
}

pub struct OpenAiStructured {
    chat: ChatClient,
}

impl OpenAiStructured {
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl StructuredGenerator for OpenAiStructured {
    async fn generate(&self, prompt: &str, schema: Schema) -> Result<StructuredOutput, CollabError> {
        info!("Requesting structured {:?}", schema);
        let raw = self.chat.complete(None, prompt, true).await?;
        parse_structured(schema, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scene_list() {
        let raw = r#"{"scenes":[{"scene":"A lab","narration":"It began with a bite."}]}"#;
        let scenes = parse_structured(Schema::SceneList, raw)
            .unwrap()
            .into_scenes()
            .unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].narration, "It began with a bite.");
    }

    #[test]
    fn fenced_reply_is_accepted() {
        let raw = "```json\n{\"image_prompt\": \"low angle, neon rain\"}\n```";
        let out = parse_structured(Schema::ImagePrompt, raw).unwrap();
        assert_eq!(out, StructuredOutput::ImagePrompt("low angle, neon rain".into()));
    }

    #[test]
    fn wrong_shape_is_a_typed_parse_error() {
        let err = parse_structured(Schema::Metadata, r#"{"title": 3}"#).unwrap_err();
        assert!(matches!(err, CollabError::Parse(_)));
    }

    #[test]
    fn variant_mismatch_is_rejected() {
        let out = StructuredOutput::ImagePrompt("x".into());
        assert!(matches!(out.into_metadata(), Err(CollabError::Parse(_))));
    }

    #[test]
    fn metadata_keeps_keyword_order() {
        let raw = r#"{"title":"T","description":"D","keywords":["b","a","c"]}"#;
        let meta = parse_structured(Schema::Metadata, raw)
            .unwrap()
            .into_metadata()
            .unwrap();
        assert_eq!(meta.keywords, vec!["b", "a", "c"]);
    }
}
