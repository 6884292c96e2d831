//! Optional LLM reranker for borderline matches.
//!
//! Consulted only for `needs_review` decisions; a confident "same entity"
//! verdict upgrades the decision to `auto_match`. Any failure leaves the
//! decision unchanged, so the reranker never sits on the critical path.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RERANK_MODEL: &str = "gpt-4o";

/// The reranker's judgment on a (query, candidate) pair.
#[derive(Debug, Clone, Deserialize)]
pub struct RerankVerdict {
    pub same: bool,
    pub confidence: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Pairwise entity-identity judge.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn compare(&self, query_raw: &str, candidate_raw: &str) -> Result<RerankVerdict>;
}

/// OpenAI chat-completions implementation.
pub struct OpenAiReranker {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: serde_json::Value,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl OpenAiReranker {
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            bail!("OpenAI API key is empty");
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            model: RERANK_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }
}

#[async_trait]
impl Reranker for OpenAiReranker {
    async fn compare(&self, query_raw: &str, candidate_raw: &str) -> Result<RerankVerdict> {
        let prompt = format!(
            "Are these two payee names the same business entity?\n\n\
             Query: {query_raw}\n\
             Candidate: {candidate_raw}\n\n\
             Consider variations, abbreviations, and common business name differences.\n\
             Respond with JSON: {{\"same\": true/false, \"confidence\": 0.0-1.0, \"reason\": \"...\"}}"
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are an expert at business entity resolution.".to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: json!({"type": "json_object"}),
            temperature: 0.1,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Rerank request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("rerank API returned {status}: {body}");
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse rerank response")?;
        let Some(choice) = parsed.choices.into_iter().next() else {
            bail!("rerank API returned no choices");
        };

        let verdict: RerankVerdict = serde_json::from_str(&choice.message.content)
            .context("Rerank verdict was not valid JSON")?;
        Ok(verdict)
    }
}
