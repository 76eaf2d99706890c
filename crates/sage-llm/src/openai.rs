//! OpenAI chat completions adapter.
//!
//! Works with the OpenAI API and any endpoint that speaks the same
//! `/v1/chat/completions` protocol with SSE streaming.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use sage_core::{Chunk, ChunkStream, ModelInfo, Provider, Request, Response, SageError, Usage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::http;
use crate::stream::{self, LineDecoder};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODELS_URL: &str = "https://api.openai.com/v1/models";
const COMPLETIONS_PATH: &str = "/v1/chat/completions";
const MODELS_PATH: &str = "/v1/models";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    delta: Option<ResponseMessage>,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct StreamPayload {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// Returns true for model families that take `max_completion_tokens`.
fn uses_max_completion_tokens(model: &str) -> bool {
    model.starts_with("o1")
        || model.starts_with("o3")
        || model.contains("gpt-4o")
        || model.contains("gpt-5")
}

/// Keeps chat models; drops embeddings, audio, moderation and the like.
fn is_chat_model(id: &str) -> bool {
    id.contains("gpt") || id.contains("o1") || id.contains("o3")
}

fn build_request(req: &Request, stream: bool) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = req.system_prompt() {
        messages.push(ChatMessage { role: "system", content: system.to_string() });
    }
    messages.push(ChatMessage { role: "user", content: req.prompt.clone() });

    let (max_tokens, max_completion_tokens) = match req.token_limit() {
        Some(limit) if uses_max_completion_tokens(&req.model) => (None, Some(limit)),
        Some(limit) => (Some(limit), None),
        None => (None, None),
    };

    ChatRequest {
        model: req.model.clone(),
        messages,
        max_tokens,
        max_completion_tokens,
        stream,
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .map(|e| e.message)
}

/// SSE decoder for chat completion chunks.
#[derive(Default)]
pub(crate) struct OpenAiDecoder;

impl LineDecoder for OpenAiDecoder {
    fn decode_line(&mut self, line: &str) -> Vec<Chunk> {
        let Some(data) = stream::sse_data(line) else {
            return vec![];
        };
        if data.trim() == DONE_SENTINEL {
            return vec![Chunk::Done];
        }

        let payload: StreamPayload = match serde_json::from_str(data) {
            Ok(p) => p,
            Err(e) => return vec![Chunk::Error(SageError::StreamDecode(e.to_string()))],
        };

        if let Some(err) = payload.error {
            return vec![Chunk::Error(SageError::Provider(err.message))];
        }

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|text| !text.is_empty())
            .map(Chunk::Content)
            .into_iter()
            .collect()
    }
}

/// Client for OpenAI-compatible chat completion APIs.
#[derive(Debug, Clone, Default)]
pub struct OpenAiProvider {
    client: Client,
}

impl OpenAiProvider {
    /// Creates a provider with its own connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider that shares an existing connection pool.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn post(&self, req: &Request, body: &ChatRequest) -> reqwest::RequestBuilder {
        let url = http::endpoint(req.base_url(), COMPLETIONS_PATH, OPENAI_API_URL);
        debug!(url = %url, model = %req.model, stream = body.stream, "OpenAI request");

        self.client
            .post(url)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", req.api_key().unwrap_or_default()))
            .json(body)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, req: Request) -> Result<Response, SageError> {
        let start = Instant::now();
        let body = build_request(&req, false);
        let response = http::send(self.post(&req, &body), &req).await?;

        if !response.status().is_success() {
            let cancel = req.cancel.as_ref();
            return Err(http::status_error("openai", response, error_message, cancel).await);
        }

        let resp: ChatResponse = http::read_json(response, req.cancel.as_ref()).await?;
        let usage = resp.usage.unwrap_or_default();
        let choice = resp.choices.into_iter().next().ok_or(SageError::EmptyResponse)?;
        let content = choice.message.and_then(|m| m.content).unwrap_or_default();

        info!(
            "OpenAI: {}ms, tokens: {}/{} (in/out)",
            start.elapsed().as_millis(),
            usage.prompt_tokens,
            usage.completion_tokens
        );

        Ok(Response {
            content,
            model: req.model,
            usage: Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            },
        })
    }

    async fn complete_stream(&self, req: Request) -> Result<ChunkStream, SageError> {
        let body = build_request(&req, true);
        let response = http::send(self.post(&req, &body), &req).await?;

        if !response.status().is_success() {
            let cancel = req.cancel.as_ref();
            return Err(http::status_error("openai", response, error_message, cancel).await);
        }

        Ok(stream::spawn_decoder(response, OpenAiDecoder, req.cancel))
    }

    async fn list_models(
        &self,
        api_key: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<Vec<ModelInfo>, SageError> {
        let url = http::endpoint(base_url, MODELS_PATH, OPENAI_MODELS_URL);
        let builder = self
            .client
            .get(url)
            .header("authorization", format!("Bearer {}", api_key.unwrap_or_default()));

        let response = builder.send().await.map_err(|e| SageError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(http::status_error("openai", response, error_message, None).await);
        }

        let list: ModelList = http::read_json(response, None).await?;
        Ok(list
            .data
            .into_iter()
            .filter(|m| is_chat_model(&m.id))
            .map(|m| ModelInfo::bare(m.id))
            .collect())
    }
}
