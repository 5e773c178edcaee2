use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::ResearchConfig;
use crate::error::CollabError;
use crate::llm::ChatClient;
use crate::prompts::RESEARCH_SYSTEM;

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

/// Turns a topic into a storyline.
#[async_trait]
pub trait Researcher: Send + Sync {
    async fn research(&self, topic: &str) -> Result<String, CollabError>;
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
}

/// Flattens search output into the notes handed to the model.
pub fn research_notes(response: &SearchResponse) -> String {
    let mut notes = String::new();
    if let Some(answer) = response.answer.as_deref().filter(|a| !a.trim().is_empty()) {
        notes.push_str("Summary: ");
        notes.push_str(answer.trim());
        notes.push_str("\n\n");
    }
    for (i, r) in response.results.iter().enumerate() {
        notes.push_str(&format!("[{}] {} ({})\n{}\n\n", i + 1, r.title, r.url, r.content.trim()));
    }
    notes
}

/// Web search through Tavily, summarized by the chat model.
pub struct TavilyResearcher {
    client: Client,
    config: ResearchConfig,
    chat: ChatClient,
}

impl TavilyResearcher {
    pub fn new(config: ResearchConfig, chat: ChatClient) -> Self {
        Self {
            client: Client::new(),
            config,
            chat,
        }
    }

    async fn search(&self, query: &str) -> Result<SearchResponse, CollabError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| CollabError::Research("no Tavily API key configured".into()))?;
        let body = json!({
            "api_key": api_key,
            "query": query,
            "max_results": self.config.max_results,
            "search_depth": "advanced",
            "include_answer": true,
        });
        let res = self
            .client
            .post(TAVILY_SEARCH_URL)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<SearchResponse>()
            .await?;
        Ok(res)
    }
}

#[async_trait]
impl Researcher for TavilyResearcher {
    async fn research(&self, topic: &str) -> Result<String, CollabError> {
        info!("Researching topic '{}'", topic);
        let results = self.search(topic).await?;
        debug!("Search returned {} results", results.results.len());
        if results.results.is_empty() && results.answer.is_none() {
            return Err(CollabError::Research(format!("no search results for '{}'", topic)));
        }

        let user = format!("Topic: {}\n\nResearch notes:\n{}", topic, research_notes(&results));
        let storyline = self
            .chat
            .complete(Some(RESEARCH_SYSTEM), &user, false)
            .await
            .map_err(|e| CollabError::Research(e.to_string()))?;
        if storyline.trim().is_empty() {
            return Err(CollabError::Research("empty storyline".into()));
        }
        Ok(storyline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_include_answer_and_numbered_sources() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"answer":"Peter Parker was bitten.","results":[
                {"title":"Origin","url":"https://a.example","content":"Radioactive spider."},
                {"title":"Comics","url":"https://b.example"}
            ]}"#,
        )
        .unwrap();
        let notes = research_notes(&response);
        assert!(notes.starts_with("Summary: Peter Parker was bitten."));
        assert!(notes.contains("[1] Origin (https://a.example)\nRadioactive spider."));
        assert!(notes.contains("[2] Comics (https://b.example)"));
    }
}
