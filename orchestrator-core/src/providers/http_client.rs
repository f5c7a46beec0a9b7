//! Shared HTTP transport helper used by every HTTP-backed provider adapter
//! (OpenAI, Gemini, OpenRouter, Ollama), so each backend file stays an
//! adapter — request/response translation — rather than its own
//! reimplementation of connection handling and status-code mapping.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{header::HeaderMap, Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::TransportError;

#[derive(Clone, Debug)]
pub enum AuthStrategy {
    Bearer { token: String },
    Header { name: String, value: String },
    None,
}

#[derive(Clone)]
pub struct HttpProviderClient {
    http: Client,
    base_url: String,
    default_headers: HeaderMap,
}

impl HttpProviderClient {
    pub fn new(
        timeout: Duration,
        base_url: Option<String>,
        default_base: &str,
        headers: &HashMap<String, String>,
        auth: AuthStrategy,
    ) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Configuration {
                message: format!("failed to build http client: {e}"),
            })?;

        let mut default_headers = HeaderMap::new();
        match auth {
            AuthStrategy::Bearer { token } => {
                if let Ok(value) = format!("Bearer {token}").parse() {
                    default_headers.insert("Authorization", value);
                }
            }
            AuthStrategy::Header { name, value } => {
                if let (Ok(name), Ok(value)) =
                    (name.parse::<reqwest::header::HeaderName>(), value.parse())
                {
                    default_headers.insert(name, value);
                }
            }
            AuthStrategy::None => {}
        }
        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (k.parse::<reqwest::header::HeaderName>(), v.parse()) {
                default_headers.insert(name, value);
            }
        }

        let base_url = base_url.unwrap_or_else(|| default_base.to_string());

        Ok(Self {
            http,
            base_url,
            default_headers,
        })
    }

    fn build_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        }
    }

    pub async fn post_json<TReq: Serialize + Sync, TResp: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TResp, TransportError> {
        let resp = self
            .http
            .request(Method::POST, self.build_url(path))
            .headers(self.default_headers.clone())
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(resp.json::<TResp>().await?)
    }
}

/// Maps an unsuccessful HTTP response to the narrow transport error; the
/// caller then converts it to a canonical [`crate::error::RunnerError`].
pub async fn map_error_response(resp: Response) -> TransportError {
    let status = resp.status();
    match resp.text().await {
        Ok(body) => {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").cloned())
                .and_then(|e| e.get("message").cloned())
                .and_then(|m| m.as_str().map(|s| s.to_string()))
                .unwrap_or_else(|| body.clone());

            match status.as_u16() {
                401 => TransportError::InvalidApiKey,
                404 => TransportError::ModelNotFound {
                    model: "unknown".to_string(),
                },
                429 => TransportError::RateLimit,
                503 => TransportError::ServiceUnavailable,
                code => TransportError::Api { code, message },
            }
        }
        Err(_) => TransportError::Api {
            code: status.as_u16(),
            message: "failed to read error response body".to_string(),
        },
    }
}
