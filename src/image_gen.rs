use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::config::ImageConfig;
use crate::error::CollabError;

/// Writes exactly one image for `prompt` at `output_path`.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str, output_path: &Path) -> Result<(), CollabError>;
}

#[derive(Debug, Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Option<Value>,
}

/// First URL in a prediction's output, which may be a string or a list.
fn first_output_url(output: &Value) -> Option<&str> {
    match output {
        Value::String(url) => Some(url.as_str()),
        Value::Array(items) => items.iter().find_map(Value::as_str),
        _ => None,
    }
}

pub struct ReplicateImages {
    client: Client,
    config: ImageConfig,
}

impl ReplicateImages {
    pub fn new(config: ImageConfig) -> Result<Self, CollabError> {
        let client = Client::builder().timeout(Duration::from_secs(300)).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ImageGenerator for ReplicateImages {
    async fn generate_image(&self, prompt: &str, output_path: &Path) -> Result<(), CollabError> {
        let token = self
            .config
            .api_token
            .as_deref()
            .ok_or_else(|| CollabError::Generation("no Replicate API token configured".into()))?;

        let url = format!(
            "https://api.replicate.com/v1/models/{}/predictions",
            self.config.model
        );
        let body = json!({
            "input": {
                "prompt": prompt,
                "go_fast": true,
                "megapixels": "1",
                "num_outputs": 1,
                "aspect_ratio": self.config.aspect_ratio,
                "output_format": "jpg",
                "output_quality": 100,
                "num_inference_steps": 4
            }
        });
        let prediction: Prediction = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if prediction.status != "succeeded" {
            return Err(CollabError::Generation(format!(
                "prediction {}: {}",
                prediction.status,
                prediction.error.map(|e| e.to_string()).unwrap_or_default()
            )));
        }
        let image_url = first_output_url(&prediction.output)
            .ok_or_else(|| CollabError::Generation("prediction has no output".into()))?;

        let bytes = self
            .client
            .get(image_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output_path, &bytes).await?;
        info!("Image written to {}", output_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_url_from_list_or_string() {
        assert_eq!(
            first_output_url(&json!(["https://x/1.jpg", "https://x/2.jpg"])),
            Some("https://x/1.jpg")
        );
        assert_eq!(first_output_url(&json!("https://x/a.jpg")), Some("https://x/a.jpg"));
        assert_eq!(first_output_url(&json!(null)), None);
    }
}
