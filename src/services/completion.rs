use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{error, info};
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::Config;

/// Seam to the external completion service: one prompt in, raw text out.
/// The provider is opaque; tests substitute a stub.
#[async_trait]
pub trait CompletionBackend: Send + Sync + 'static {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible chat-completions client. One request per query, no
/// retry and no streaming; transport failures bubble up to the caller.
#[derive(Clone, Debug)]
pub struct HttpCompletionService {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl HttpCompletionService {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.completion_timeout_secs))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        info!(
            "Completion client initialized (model: {}, base: {})",
            config.completion_model, config.completion_base_url
        );
        Ok(Self {
            client,
            api_key: config.completion_api_key.clone(),
            model: config.completion_model.clone(),
            base_url: config.completion_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionService {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request_body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ]
        });

        let response = match self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                error!("Failed to send completion request: {}", e);
                if e.is_timeout() {
                    return Err(anyhow!("completion request timed out"));
                }
                return Err(anyhow!("failed to reach completion service: {}", e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            error!("Completion service error: status {}: {}", status, error_text);
            return Err(anyhow!(
                "completion service returned status {}: {}",
                status,
                error_text
            ));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| anyhow!("failed to parse completion response: {}", e))?;

        match response_json["choices"][0]["message"]["content"].as_str() {
            Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
            Some(_) | None => {
                error!(
                    "Completion response carried no content: {:?}",
                    response_json
                );
                Err(anyhow!("completion response contained no text"))
            }
        }
    }
}
