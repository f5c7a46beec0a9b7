//! OpenRouter adapter — an OpenAI-compatible surface aggregating many
//! upstream models behind one API. Bearer auth from `OPENROUTER_API_KEY`;
//! base URL overridable via `OPENROUTER_BASE_URL` or `ProviderConfig.base_url`.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;
use crate::models::{ProviderRequest, ProviderResponse, Role, TokenUsage};

use super::http_client::{AuthStrategy, HttpProviderClient};
use super::{Provider, ProviderConfig, CAP_STREAMING};

pub struct OpenRouterProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
}

impl OpenRouterProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, RunnerError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
            .ok_or_else(|| RunnerError::AuthError {
                message: format!("no api key configured for provider '{}'", config.name),
            })?;

        let base_url = config
            .base_url
            .clone()
            .or_else(|| std::env::var("OPENROUTER_BASE_URL").ok());

        let http = HttpProviderClient::new(
            config.timeout,
            base_url,
            "https://openrouter.ai/api/v1",
            &config.headers,
            AuthStrategy::Bearer { token: api_key },
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
impl Provider for OpenRouterProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec![CAP_STREAMING]
    }

    async fn invoke(
        &self,
        request: &ProviderRequest,
        _deadline: Instant,
    ) -> Result<ProviderResponse, RunnerError> {
        let model = self.map_model(&request.model);

        let mut messages: Vec<OpenRouterMessage> = request
            .messages
            .iter()
            .map(|m| OpenRouterMessage {
                role: role_str(m.role).to_string(),
                content: m.content.clone(),
            })
            .collect();
        if messages.is_empty() {
            if let Some(prompt) = &request.prompt {
                messages.push(OpenRouterMessage {
                    role: "user".to_string(),
                    content: prompt.clone(),
                });
            }
        }

        let wire_request = OpenRouterChatRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let started = Instant::now();
        let wire_response: OpenRouterChatResponse = self
            .http
            .post_json("/chat/completions", &wire_request)
            .await
            .map_err(RunnerError::from)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let choice = wire_response.choices.into_iter().next();
        let text = choice
            .as_ref()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(ProviderResponse {
            text,
            latency_ms,
            token_usage: wire_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
            model: Some(wire_response.model),
            finish_reason: choice.and_then(|c| c.finish_reason),
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

#[derive(Serialize)]
struct OpenRouterChatRequest {
    model: String,
    messages: Vec<OpenRouterMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct OpenRouterMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenRouterChatResponse {
    model: String,
    choices: Vec<OpenRouterChoice>,
    usage: Option<OpenRouterUsage>,
}

#[derive(Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenRouterUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
