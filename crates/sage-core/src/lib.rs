//! Core domain types and error definitions for sage.
//!
//! This crate provides the provider-agnostic model shared by every adapter:
//!
//! - [`Request`] — A single prompt (+ optional system message) bound for one model
//! - [`Response`] and [`Usage`] — Result of a blocking completion
//! - [`Chunk`] and [`ChunkStream`] — Incremental output of a streaming completion
//! - [`Provider`] — Capability trait implemented by each protocol adapter
//! - [`SageError`] — Error taxonomy for transport, HTTP status, and decode failures
//!
//! # Example
//!
//! ```rust
//! use sage_core::Request;
//!
//! let req = Request::new("gpt-4o", "2+2?")
//!     .with_system("Answer tersely.")
//!     .with_max_tokens(16)
//!     .with_api_key("sk-test");
//!
//! assert_eq!(req.system_prompt(), Some("Answer tersely."));
//! assert_eq!(req.token_limit(), Some(16));
//! ```

mod stream;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use stream::{ChunkSender, ChunkStream};

/// Errors that can occur while talking to a provider.
///
/// Every variant carries plain strings so errors can travel inside a [`Chunk`]
/// and be compared in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SageError {
    /// Building or sending the HTTP request failed before a status was known.
    #[error("request failed: {0}")]
    Transport(String),

    /// The provider rejected the API key (HTTP 401).
    #[error("invalid API key: {0}")]
    Unauthorized(String),

    /// The provider is throttling this key (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Any other non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body was not the JSON this layer expects.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The provider answered with zero choices or content blocks.
    #[error("no content in response")]
    EmptyResponse,

    /// The provider reported an error inside an otherwise successful payload.
    #[error("provider error: {0}")]
    Provider(String),

    /// A streamed line or event carried malformed JSON.
    #[error("failed to parse stream data: {0}")]
    StreamDecode(String),

    /// Reading the response body failed after the headers were accepted.
    #[error("stream read error: {0}")]
    StreamRead(String),

    /// The body ended before the provider's terminal marker.
    #[error("stream ended before the completion marker")]
    IncompleteStream,

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// No adapter is registered under this name.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

/// Normalized completion request.
///
/// An empty `system` and a `max_tokens` of zero are treated exactly like
/// absent values by every adapter.
#[derive(Debug, Clone)]
pub struct Request {
    /// Provider-specific model identifier (e.g., "gpt-4o", "claude-sonnet-4-20250514").
    pub model: String,
    /// Optional system prompt.
    pub system: Option<String>,
    /// The user prompt.
    pub prompt: String,
    /// Optional completion token limit.
    pub max_tokens: Option<u32>,
    /// Decrypted API key, supplied by the credential collaborator.
    pub api_key: Option<SecretString>,
    /// Optional base URL override (scheme + host, no API path).
    pub base_url: Option<String>,
    /// Deadline for the whole call, including streamed body reads.
    pub timeout: Option<Duration>,
    /// Caller-driven cancellation signal.
    pub cancel: Option<CancellationToken>,
}

impl Request {
    /// Creates a request with only a model and a prompt.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            max_tokens: None,
            api_key: None,
            base_url: None,
            timeout: None,
            cancel: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Returns the system prompt if one is set and non-empty.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system.as_deref().filter(|s| !s.is_empty())
    }

    /// Returns the token limit if one is set and non-zero.
    pub fn token_limit(&self) -> Option<u32> {
        self.max_tokens.filter(|&n| n > 0)
    }

    /// Returns the API key if one is set and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .filter(|k| !k.is_empty())
    }

    /// Returns the base URL override if one is set and non-empty.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref().filter(|s| !s.is_empty())
    }
}

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Complete response from a blocking call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub content: String,
    /// The model that was requested.
    pub model: String,
    pub usage: Usage,
}

/// One unit of a streamed completion.
///
/// A stream is zero or more `Content` chunks followed by exactly one terminal
/// chunk (`Done` or `Error`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// A non-empty content delta.
    Content(String),
    /// The provider signalled the end of the completion.
    Done,
    /// The stream failed; nothing follows.
    Error(SageError),
}

impl Chunk {
    /// Returns `true` for `Done` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Chunk::Done | Chunk::Error(_))
    }

    /// Returns the content delta, if this is a content chunk.
    pub fn content(&self) -> Option<&str> {
        match self {
            Chunk::Content(text) => Some(text),
            _ => None,
        }
    }
}

/// A model offered by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ModelInfo {
    /// Creates an entry whose display name is its id.
    pub fn bare(id: impl Into<String>) -> Self {
        let id = id.into();
        Self { name: id.clone(), id, description: String::new() }
    }
}

/// Capability interface implemented by each protocol adapter.
///
/// Callers depend only on this trait (usually as `Arc<dyn Provider>`), so a
/// test double can stand in for any adapter.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the provider identifier (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// Sends a request and returns the full response.
    async fn complete(&self, req: Request) -> Result<Response, SageError>;

    /// Sends a request and streams chunks.
    ///
    /// A non-success status is returned here as an error; no stream is started.
    async fn complete_stream(&self, req: Request) -> Result<ChunkStream, SageError>;

    /// Lists chat-capable models. Providers without a listing endpoint return
    /// a static catalog.
    async fn list_models(
        &self,
        api_key: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<Vec<ModelInfo>, SageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_values_count_as_absent() {
        let req = Request::new("gpt-4o", "2+2?")
            .with_system("")
            .with_max_tokens(0)
            .with_api_key("")
            .with_base_url("");

        assert_eq!(req.system_prompt(), None);
        assert_eq!(req.token_limit(), None);
        assert_eq!(req.api_key(), None);
        assert_eq!(req.base_url(), None);
    }

    #[test]
    fn debug_output_hides_api_key() {
        let req = Request::new("gpt-4o", "hi").with_api_key("sk-very-secret");
        let printed = format!("{:?}", req);
        assert!(!printed.contains("sk-very-secret"));
    }

    #[test]
    fn terminal_chunks() {
        assert!(Chunk::Done.is_terminal());
        assert!(Chunk::Error(SageError::IncompleteStream).is_terminal());
        assert!(!Chunk::Content("x".into()).is_terminal());
        assert_eq!(Chunk::Content("x".into()).content(), Some("x"));
        assert_eq!(Chunk::Done.content(), None);
    }
}
