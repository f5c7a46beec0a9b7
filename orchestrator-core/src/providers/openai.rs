//! OpenAI chat-completions adapter. Authenticates via `OPENAI_API_KEY` or
//! `ProviderConfig.api_key`; speaks the standard `/chat/completions` wire
//! format that [`super::openrouter::OpenRouterProvider`] also targets.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;
use crate::models::{Message, ProviderRequest, ProviderResponse, Role, TokenUsage};

use super::http_client::{AuthStrategy, HttpProviderClient};
use super::{Provider, ProviderConfig, CAP_JSON_MODE, CAP_STREAMING};

pub struct OpenAiProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, RunnerError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| RunnerError::AuthError {
                message: format!("no api key configured for provider '{}'", config.name),
            })?;

        let http = HttpProviderClient::new(
            config.timeout,
            config.base_url.clone(),
            "https://api.openai.com/v1",
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
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> Vec<&'static str> {
        vec![CAP_STREAMING, CAP_JSON_MODE]
    }

    async fn invoke(
        &self,
        request: &ProviderRequest,
        _deadline: Instant,
    ) -> Result<ProviderResponse, RunnerError> {
        let wire_request = to_wire_request(request, self.map_model(&request.model));

        let started = Instant::now();
        let wire_response: OpenAiChatResponse = self
            .http
            .post_json("/chat/completions", &wire_request)
            .await
            .map_err(RunnerError::from)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        Ok(from_wire_response(wire_response, latency_ms))
    }
}

fn to_wire_request(request: &ProviderRequest, model: String) -> OpenAiChatRequest {
    let mut messages: Vec<OpenAiMessage> = request
        .messages
        .iter()
        .map(|m| OpenAiMessage {
            role: role_str(m.role).to_string(),
            content: m.content.clone(),
        })
        .collect();
    if messages.is_empty() {
        if let Some(prompt) = &request.prompt {
            messages.push(OpenAiMessage {
                role: "user".to_string(),
                content: prompt.clone(),
            });
        }
    }

    OpenAiChatRequest {
        model,
        messages,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        stop: if request.stop.is_empty() {
            None
        } else {
            Some(request.stop.clone())
        },
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn from_wire_response(resp: OpenAiChatResponse, latency_ms: u64) -> ProviderResponse {
    let choice = resp.choices.into_iter().next();
    let text = choice
        .as_ref()
        .map(|c| c.message.content.clone())
        .unwrap_or_default();
    let finish_reason = choice.and_then(|c| c.finish_reason);

    ProviderResponse {
        text,
        latency_ms,
        token_usage: resp.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }),
        model: Some(resp.model),
        finish_reason,
        raw: None,
    }
}

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    #[test]
    fn to_wire_request_falls_back_to_prompt_when_no_messages() {
        let req = ProviderRequest::builder("gpt-4o-mini")
            .with_prompt("hello")
            .build()
            .unwrap();
        let wire = to_wire_request(&req, "gpt-4o-mini".to_string());
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.messages[0].role, "user");
        assert_eq!(wire.messages[0].content, "hello");
    }

    #[test]
    fn to_wire_request_prefers_messages_over_prompt() {
        let req = ProviderRequest::builder("gpt-4o-mini")
            .with_prompt("ignored")
            .with_messages(vec![Message::user("actual")])
            .build()
            .unwrap();
        let wire = to_wire_request(&req, "gpt-4o-mini".to_string());
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.messages[0].content, "actual");
    }

    #[tokio::test]
    async fn invoke_parses_a_real_chat_completions_response() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "choices": [{
                    "message": {"role": "assistant", "content": "hi there"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2}
            })))
            .mount(&server)
            .await;

        let mut config = ProviderConfig::new("openai-test", "openai").with_api_key("sk-test");
        config.base_url = Some(server.uri());
        let provider = OpenAiProvider::new(config).unwrap();

        let request = ProviderRequest::builder("gpt-4o-mini")
            .with_prompt("hello")
            .build()
            .unwrap();
        let response = provider
            .invoke(&request, Instant::now() + std::time::Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response.text, "hi there");
        assert_eq!(response.token_usage.unwrap().total(), 5);
    }

    #[tokio::test]
    async fn invoke_maps_401_to_auth_error() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "invalid credentials"}
            })))
            .mount(&server)
            .await;

        let mut config = ProviderConfig::new("openai-test", "openai").with_api_key("sk-test");
        config.base_url = Some(server.uri());
        let provider = OpenAiProvider::new(config).unwrap();

        let request = ProviderRequest::builder("gpt-4o-mini")
            .with_prompt("hello")
            .build()
            .unwrap();
        let err = provider
            .invoke(&request, Instant::now() + std::time::Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, RunnerError::AuthError { .. }));
    }
}
