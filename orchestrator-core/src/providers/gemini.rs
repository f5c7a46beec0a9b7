//! Google Gemini adapter. API key from `GEMINI_API_KEY` or
//! `ProviderConfig.api_key`, sent as the `x-goog-api-key` header.

use std::time::Instant;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::RunnerError;
use crate::models::{ProviderRequest, ProviderResponse, Role, TokenUsage};

use super::http_client::map_error_response;
use super::{Provider, ProviderConfig};

pub struct GeminiProvider {
    client: Client,
    config: ProviderConfig,
    base_url: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, RunnerError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .ok_or_else(|| RunnerError::AuthError {
                message: format!("no api key configured for provider '{}'", config.name),
            })?;

        let client = Client::builder().timeout(config.timeout).build().map_err(|e| {
            RunnerError::ConfigError {
                message: format!("failed to build http client: {e}"),
            }
        })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());

        Ok(Self {
            client,
            config,
            base_url,
            api_key,
        })
    }

    fn map_model(&self, model: &str) -> String {
        self.config
            .model_mapping
            .get(model)
            .cloned()
            .unwrap_or_else(|| model.to_string())
    }

    fn build_headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Content-Type", "application/json".parse().unwrap());
        if let Ok(value) = self.api_key.parse() {
            headers.insert("x-goog-api-key", value);
        }
        for (key, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) =
                (key.parse::<reqwest::header::HeaderName>(), value.parse())
            {
                headers.insert(name, value);
            }
        }
        headers
    }
}

#[async_trait::async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn invoke(
        &self,
        request: &ProviderRequest,
        _deadline: Instant,
    ) -> Result<ProviderResponse, RunnerError> {
        let model = self.map_model(&request.model);
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let wire_request = to_gemini_request(request);

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .headers(self.build_headers())
            .json(&wire_request)
            .send()
            .await
            .map_err(crate::error::TransportError::from)
            .map_err(RunnerError::from)?;

        if !response.status().is_success() {
            return Err(map_error_response(response).await.into());
        }

        let wire_response: GeminiResponse = response
            .json()
            .await
            .map_err(crate::error::TransportError::from)
            .map_err(RunnerError::from)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        Ok(from_gemini_response(wire_response, model, latency_ms))
    }
}

fn to_gemini_request(request: &ProviderRequest) -> GeminiRequest {
    let mut contents = Vec::new();
    for message in &request.messages {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "model",
            // Gemini has no system role; fold it into a leading user turn.
            Role::System => "user",
        };
        contents.push(GeminiContent {
            role: role.to_string(),
            parts: vec![GeminiPart {
                text: message.content.clone(),
            }],
        });
    }
    if contents.is_empty() {
        if let Some(prompt) = &request.prompt {
            contents.push(GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: prompt.clone(),
                }],
            });
        }
    }

    GeminiRequest {
        contents,
        generation_config: Some(GeminiGenerationConfig {
            temperature: request.temperature,
            max_output_tokens: Some(request.max_tokens as i32),
            top_p: request.top_p,
        }),
    }
}

fn from_gemini_response(response: GeminiResponse, model: String, latency_ms: u64) -> ProviderResponse {
    let text = response
        .candidates
        .first()
        .map(|c| {
            c.content
                .parts
                .iter()
                .map(|p| p.text.clone())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    ProviderResponse {
        text,
        latency_ms,
        token_usage: response.usage_metadata.map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
        }),
        model: Some(model),
        finish_reason: response
            .candidates
            .first()
            .and_then(|c| c.finish_reason.clone()),
        raw: None,
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiUsage {
    prompt_token_count: u32,
    candidates_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    #[test]
    fn system_role_folds_into_user() {
        let req = ProviderRequest::builder("gemini-1.5-flash")
            .with_messages(vec![Message::system("be terse"), Message::user("hi")])
            .build()
            .unwrap();
        let wire = to_gemini_request(&req);
        assert_eq!(wire.contents.len(), 2);
        assert_eq!(wire.contents[0].role, "user");
    }

    #[test]
    fn assistant_role_maps_to_model() {
        let req = ProviderRequest::builder("gemini-1.5-flash")
            .with_messages(vec![Message::assistant("ok")])
            .build()
            .unwrap();
        let wire = to_gemini_request(&req);
        assert_eq!(wire.contents[0].role, "model");
    }
}
