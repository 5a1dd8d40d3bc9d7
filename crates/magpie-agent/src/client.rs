//! HTTP client for the chat-completion service.
//!
//! OpenAI-compatible endpoint with bearer auth; the optional `HTTP-Referer`
//! and `X-Title` headers identify the bot to routing providers. After a
//! completed call a fire-and-forget generation-stats lookup can record cost,
//! latency and token counts.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use magpie_core::config::LlmConfig;

use crate::provider::{ChatRequest, ChatResponse, CompletionService, ProviderError};

pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    chat_path: String,
    referer: Option<String>,
    title: Option<String>,
    fetch_stats: bool,
}

impl ChatClient {
    pub fn new(cfg: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.clone(),
            chat_path: cfg.chat_path.clone(),
            referer: cfg.referer.clone(),
            title: cfg.title.clone(),
            fetch_stats: cfg.fetch_generation_stats,
        }
    }

    /// Spawn a background lookup of post-call generation stats. Failures are
    /// logged and dropped; the conversation turn never waits on this.
    fn spawn_generation_stats(&self, generation_id: String) {
        let client = self.client.clone();
        let url = format!("{}/v1/generation?id={}", self.base_url, generation_id);
        let api_key = self.api_key.clone();
        tokio::spawn(async move {
            let resp = match client.get(&url).bearer_auth(&api_key).send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!(error = %e, "generation stats request failed");
                    return;
                }
            };
            match resp.json::<GenerationStats>().await {
                Ok(stats) => debug!(
                    generation = %generation_id,
                    cost = stats.data.total_cost,
                    latency_ms = stats.data.latency,
                    tokens_prompt = stats.data.tokens_prompt,
                    tokens_completion = stats.data.tokens_completion,
                    "generation stats"
                ),
                Err(e) => debug!(error = %e, "generation stats parse failed"),
            }
        });
    }
}

#[async_trait]
impl CompletionService for ChatClient {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}{}", self.base_url, self.chat_path);

        debug!(
            model = %req.model,
            messages = req.messages.len(),
            tools = req.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "sending chat completion request"
        );

        let mut http = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json");
        if let Some(referer) = &self.referer {
            http = http.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            http = http.header("X-Title", title);
        }

        let resp = http.json(req).send().await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "chat API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        if self.fetch_stats {
            if let Some(id) = api_resp.id.clone() {
                self.spawn_generation_stats(id);
            }
        }

        Ok(api_resp)
    }
}

#[derive(Deserialize)]
struct GenerationStats {
    data: GenerationData,
}

#[derive(Deserialize)]
struct GenerationData {
    #[serde(default)]
    total_cost: f64,
    #[serde(default)]
    latency: u64,
    #[serde(default)]
    tokens_prompt: u32,
    #[serde(default)]
    tokens_completion: u32,
}
