//! Anthropic Messages API adapter with event-tagged SSE streaming.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use sage_core::{Chunk, ChunkStream, ModelInfo, Provider, Request, Response, SageError, Usage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::http;
use crate::stream::{self, LineDecoder};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MESSAGES_PATH: &str = "/v1/messages";

/// The API rejects requests without `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct NonStreamResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    #[serde(rename = "type", default)]
    delta_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(default)]
    delta: Option<ContentBlockDelta>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<ApiError>,
}

fn build_request(req: &Request, stream: bool) -> AnthropicRequest {
    AnthropicRequest {
        model: req.model.clone(),
        max_tokens: req.token_limit().unwrap_or(DEFAULT_MAX_TOKENS),
        system: req.system_prompt().map(str::to_string),
        messages: vec![AnthropicMessage { role: "user", content: req.prompt.clone() }],
        stream,
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .map(|e| e.message)
}

/// Claude models offered when listing; the API has no models endpoint here.
fn catalog() -> Vec<ModelInfo> {
    [
        ("claude-opus-4-20250514", "Claude Opus 4", "Most capable model for complex tasks"),
        ("claude-sonnet-4-20250514", "Claude Sonnet 4", "Balanced performance and speed"),
        ("claude-3-5-haiku-latest", "Claude 3.5 Haiku", "Fast and efficient for simple tasks"),
        ("claude-3-5-sonnet-latest", "Claude 3.5 Sonnet", "Previous generation balanced model"),
        ("claude-3-opus-latest", "Claude 3 Opus", "Previous generation top model"),
    ]
    .into_iter()
    .map(|(id, name, description)| ModelInfo {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
    })
    .collect()
}

/// Event-tagged SSE decoder.
///
/// An `event:` line sets the type that applies to the following `data:` lines.
/// `message_stop` ends the stream as soon as the event line arrives, whatever
/// its data payload.
#[derive(Default)]
pub(crate) struct AnthropicDecoder {
    event: String,
}

impl LineDecoder for AnthropicDecoder {
    fn decode_line(&mut self, line: &str) -> Vec<Chunk> {
        if let Some(event) = stream::sse_event(line) {
            if event == "message_stop" {
                return vec![Chunk::Done];
            }
            self.event = event.to_string();
            return vec![];
        }
        let Some(data) = stream::sse_data(line) else {
            return vec![];
        };

        match self.event.as_str() {
            "content_block_delta" => match serde_json::from_str::<StreamEvent>(data) {
                Ok(event) => event
                    .delta
                    .filter(|d| d.delta_type == "text_delta" && !d.text.is_empty())
                    .map(|d| Chunk::Content(d.text))
                    .into_iter()
                    .collect(),
                Err(e) => vec![Chunk::Error(SageError::StreamDecode(e.to_string()))],
            },
            "error" => {
                let message = error_message(data).unwrap_or_else(|| data.to_string());
                vec![Chunk::Error(SageError::Provider(message))]
            }
            _ => vec![],
        }
    }
}

/// Client for Anthropic's Claude API.
#[derive(Debug, Clone, Default)]
pub struct AnthropicProvider {
    client: Client,
}

impl AnthropicProvider {
    /// Creates a provider with its own connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider that shares an existing connection pool.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn post(&self, req: &Request, body: &AnthropicRequest) -> reqwest::RequestBuilder {
        let url = http::endpoint(req.base_url(), MESSAGES_PATH, ANTHROPIC_API_URL);
        debug!(url = %url, model = %req.model, stream = body.stream, "Anthropic request");

        self.client
            .post(url)
            .header("x-api-key", req.api_key().unwrap_or_default())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, req: Request) -> Result<Response, SageError> {
        let start = Instant::now();
        let body = build_request(&req, false);
        let response = http::send(self.post(&req, &body), &req).await?;

        if !response.status().is_success() {
            let cancel = req.cancel.as_ref();
            return Err(http::status_error("anthropic", response, error_message, cancel).await);
        }

        let resp: NonStreamResponse = http::read_json(response, req.cancel.as_ref()).await?;
        if resp.content.is_empty() {
            return Err(SageError::EmptyResponse);
        }

        let content = resp
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .map(|block| block.text)
            .unwrap_or_default();

        info!(
            "Anthropic: {}ms, tokens: {}/{}, content: {} chars",
            start.elapsed().as_millis(),
            resp.usage.input_tokens,
            resp.usage.output_tokens,
            content.len()
        );

        Ok(Response {
            content,
            model: req.model,
            usage: Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
            },
        })
    }

    async fn complete_stream(&self, req: Request) -> Result<ChunkStream, SageError> {
        let body = build_request(&req, true);
        let response = http::send(self.post(&req, &body), &req).await?;

        if !response.status().is_success() {
            let cancel = req.cancel.as_ref();
            return Err(http::status_error("anthropic", response, error_message, cancel).await);
        }

        Ok(stream::spawn_decoder(response, AnthropicDecoder::default(), req.cancel))
    }

    async fn list_models(
        &self,
        _api_key: Option<&str>,
        _base_url: Option<&str>,
    ) -> Result<Vec<ModelInfo>, SageError> {
        Ok(catalog())
    }
}
