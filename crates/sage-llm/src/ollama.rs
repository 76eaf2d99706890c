//! Native Ollama API client.
//!
//! Uses Ollama's own /api/chat endpoint (not the OpenAI-compatible one), which
//! streams newline-delimited JSON objects rather than SSE.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use sage_core::{Chunk, ChunkStream, ModelInfo, Provider, Request, Response, SageError, Usage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::http;
use crate::stream::{self, LineDecoder};

const OLLAMA_DEFAULT_HOST: &str = "http://localhost:11434";
const CHAT_PATH: &str = "/api/chat";
const TAGS_PATH: &str = "/api/tags";

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

/// One object of a streamed reply, or the whole blocking reply.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaChatResponse {
    fn error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelInfo>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelInfo {
    name: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

fn build_request(req: &Request, stream: bool) -> OllamaChatRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = req.system_prompt() {
        messages.push(OllamaMessage { role: "system", content: system.to_string() });
    }
    messages.push(OllamaMessage { role: "user", content: req.prompt.clone() });

    OllamaChatRequest { model: req.model.clone(), messages, stream }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.error)
        .filter(|e| !e.is_empty())
}

/// Formats a model name for display (e.g., "llama3:8b" -> "Llama3:8b (Local)").
fn format_display_name(model_name: &str) -> String {
    let last_segment = model_name.rsplit('/').next().unwrap_or(model_name);
    let (base, tag) = last_segment.split_once(':').unwrap_or((last_segment, ""));

    let mut chars = base.chars();
    let display_base: String = match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };

    let tag_suffix = if tag.is_empty() { String::new() } else { format!(":{tag}") };
    format!("{display_base}{tag_suffix} (Local)")
}

/// NDJSON decoder: every non-blank line is one complete JSON object.
#[derive(Default)]
pub(crate) struct OllamaDecoder;

impl LineDecoder for OllamaDecoder {
    fn decode_line(&mut self, line: &str) -> Vec<Chunk> {
        let resp: OllamaChatResponse = match serde_json::from_str(line) {
            Ok(resp) => resp,
            Err(e) => return vec![Chunk::Error(SageError::StreamDecode(e.to_string()))],
        };

        if let Some(error) = resp.error() {
            return vec![Chunk::Error(SageError::Provider(error.to_string()))];
        }

        let mut chunks = Vec::with_capacity(2);
        if let Some(message) = resp.message.filter(|m| !m.content.is_empty()) {
            chunks.push(Chunk::Content(message.content));
        }
        if resp.done {
            chunks.push(Chunk::Done);
        }
        chunks
    }
}

/// Client for a local or remote Ollama server.
#[derive(Debug, Clone, Default)]
pub struct OllamaProvider {
    client: Client,
}

impl OllamaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn url(base_url: Option<&str>, path: &str) -> String {
        let base = base_url.filter(|b| !b.is_empty()).unwrap_or(OLLAMA_DEFAULT_HOST);
        http::endpoint(Some(base), path, OLLAMA_DEFAULT_HOST)
    }

    fn authorize(builder: reqwest::RequestBuilder, api_key: Option<&str>) -> reqwest::RequestBuilder {
        match api_key.filter(|k| !k.is_empty()) {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn post(&self, req: &Request, body: &OllamaChatRequest) -> reqwest::RequestBuilder {
        let url = Self::url(req.base_url(), CHAT_PATH);
        debug!(url = %url, model = %req.model, stream = body.stream, "Ollama request");

        let builder = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(body);
        Self::authorize(builder, req.api_key())
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, req: Request) -> Result<Response, SageError> {
        let start = Instant::now();
        let body = build_request(&req, false);
        let response = http::send(self.post(&req, &body), &req).await?;

        if !response.status().is_success() {
            let cancel = req.cancel.as_ref();
            return Err(http::status_error("ollama", response, error_message, cancel).await);
        }

        let resp: OllamaChatResponse = http::read_json(response, req.cancel.as_ref()).await?;
        if let Some(error) = resp.error() {
            return Err(SageError::Provider(error.to_string()));
        }
        let message = resp.message.ok_or(SageError::EmptyResponse)?;

        info!(
            "Ollama: {}ms, tokens: {}/{}",
            start.elapsed().as_millis(),
            resp.prompt_eval_count,
            resp.eval_count
        );

        Ok(Response {
            content: message.content,
            model: req.model,
            usage: Usage {
                prompt_tokens: resp.prompt_eval_count,
                completion_tokens: resp.eval_count,
            },
        })
    }

    async fn complete_stream(&self, req: Request) -> Result<ChunkStream, SageError> {
        let body = build_request(&req, true);
        let response = http::send(self.post(&req, &body), &req).await?;

        if !response.status().is_success() {
            let cancel = req.cancel.as_ref();
            return Err(http::status_error("ollama", response, error_message, cancel).await);
        }

        Ok(stream::spawn_decoder(response, OllamaDecoder, req.cancel))
    }

    async fn list_models(
        &self,
        api_key: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<Vec<ModelInfo>, SageError> {
        let url = Self::url(base_url, TAGS_PATH);
        let response = Self::authorize(self.client.get(url), api_key)
            .send()
            .await
            .map_err(|e| SageError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(http::status_error("ollama", response, error_message, None).await);
        }

        let tags: OllamaTagsResponse = http::read_json(response, None).await?;
        let models: Vec<ModelInfo> = tags
            .models
            .into_iter()
            .map(|m| ModelInfo {
                name: format_display_name(&m.name),
                id: m.name,
                description: "Local Ollama model".to_string(),
            })
            .collect();

        info!("Discovered {} Ollama models", models.len());
        Ok(models)
    }
}
