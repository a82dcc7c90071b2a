//! OpenAI-style `/completions` client.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CompletionRequest, OracleClient};
use crate::errors::OracleError;
use crate::garden_config::OracleSection;
use crate::util::preview;

const PREVIEW_CHARS: usize = 400;

#[derive(Clone)]
pub struct OpenAiCompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl OpenAiCompletionClient {
    /// Build a client from the `[oracle]` settings. The API key is read from
    /// the environment variable named by `api_key_env`.
    pub fn from_settings(settings: &OracleSection) -> Result<Self, OracleError> {
        let api_key = env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| OracleError::MissingApiKey {
                var: settings.api_key_env.clone(),
            })?;
        Self::new(settings, api_key)
    }

    pub fn new(settings: &OracleSection, api_key: impl Into<String>) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| OracleError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    stop: &'a [String],
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    text: String,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Take the first choice's text out of a decoded response.
fn first_choice(response: CompletionResponse) -> Result<String, OracleError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| OracleError::Response("response contained no choices".into()))?;
    if choice.finish_reason.as_deref() == Some("length") {
        warn!("completion hit the token limit before the stop marker");
    }
    Ok(choice.text)
}

#[async_trait]
impl OracleClient for OpenAiCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError> {
        let body = CompletionBody {
            model: &self.model,
            prompt: &request.prompt,
            max_tokens: request.max_tokens,
            stop: &request.stop,
            temperature: self.temperature,
        };
        debug!(
            model = %self.model,
            prompt = %preview(&request.prompt, PREVIEW_CHARS),
            "requesting completion"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let decoded: CompletionResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Response(e.to_string()))?;
        let text = first_choice(decoded)?;
        debug!(completion = %preview(&text, PREVIEW_CHARS), "completion received");
        Ok(text)
    }
}
