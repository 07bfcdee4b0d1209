//! OpenAI-compatible chat completions client (Groq by default).
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Generator, GeneratorError};
use crate::config::GenerationConfig;

const SYSTEM_PROMPT: &str = "You answer questions about Nepal's National Penal Code, 2017 \
using only the law text supplied by the user. Never invent sections or citations.";

pub struct ChatGenerator {
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    client: Client,
}

impl ChatGenerator {
    pub fn new(api_key: String, config: &GenerationConfig) -> Result<Self, GeneratorError> {
        if api_key.trim().is_empty() {
            return Err(GeneratorError::MissingApiKey(config.api_key_env.clone()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GeneratorError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    /// Build a client from config, reading the key from the environment.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GeneratorError> {
        let key = config
            .api_key()
            .ok_or_else(|| GeneratorError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(key, config)
    }

    fn headers(&self) -> Result<HeaderMap, GeneratorError> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| GeneratorError::Http("API key is not a valid header value".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

impl Generator for ChatGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        debug!("POST {} (model {})", self.endpoint, self.model);
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .map_err(|e| GeneratorError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(GeneratorError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .map_err(|e| GeneratorError::InvalidResponse(e.to_string()))?;
        first_answer(parsed)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn first_answer(resp: ChatResponse) -> Result<String, GeneratorError> {
    resp.choices
        .into_iter()
        .filter_map(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
        .ok_or(GeneratorError::EmptyResponse)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
