//! Local Ollama adapter. No authentication; defaults to
//! `http://localhost:11434`, overridable via `OLLAMA_BASE_URL` or
//! `ProviderConfig.base_url`.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::RunnerError;
use crate::models::{ProviderRequest, ProviderResponse, Role, TokenUsage};

use super::http_client::{AuthStrategy, HttpProviderClient};
use super::{Provider, ProviderConfig};

pub struct OllamaProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, RunnerError> {
        let base_url = config
            .base_url
            .clone()
            .or_else(|| std::env::var("OLLAMA_BASE_URL").ok());

        let http = HttpProviderClient::new(
            config.timeout,
            base_url,
            "http://localhost:11434",
            &config.headers,
            AuthStrategy::None,
        )
        .map_err(RunnerError::from)?;

        Ok(Self { http, config })
    }

    fn map_model(&self, model: &str) -> String {
        self.config
            .model_mapping
            .get(model)
            .cloned()
            .unwrap_or_else(|| model.to_string())
    }
}

#[async_trait::async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn invoke(
        &self,
        request: &ProviderRequest,
        _deadline: Instant,
    ) -> Result<ProviderResponse, RunnerError> {
        let model = self.map_model(&request.model);

        let messages: Vec<OllamaMessage> = request
            .messages
            .iter()
            .map(|m| OllamaMessage {
                role: role_str(m.role).to_string(),
                content: m.content.clone(),
            })
            .chain(
                request
                    .prompt
                    .iter()
                    .filter(|_| request.messages.is_empty())
                    .map(|p| OllamaMessage {
                        role: "user".to_string(),
                        content: p.clone(),
                    }),
            )
            .collect();

        let wire_request = json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": request.temperature.unwrap_or(0.7),
                "num_predict": request.max_tokens,
            }
        });

        let started = Instant::now();
        let resp: serde_json::Value = self
            .http
            .post_json("/api/chat", &wire_request)
            .await
            .map_err(RunnerError::from)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let text = resp["message"]["content"].as_str().unwrap_or("").to_string();
        let prompt_tokens = resp["prompt_eval_count"].as_u64().unwrap_or(0) as u32;
        let completion_tokens = resp["eval_count"].as_u64().unwrap_or(0) as u32;

        Ok(ProviderResponse {
            text,
            latency_ms,
            token_usage: Some(TokenUsage {
                prompt_tokens,
                completion_tokens,
            }),
            model: Some(model),
            finish_reason: Some("stop".to_string()),
            raw: None,
        })
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_mapping_is_stable() {
        assert_eq!(role_str(Role::System), "system");
        assert_eq!(role_str(Role::User), "user");
        assert_eq!(role_str(Role::Assistant), "assistant");
    }
}
