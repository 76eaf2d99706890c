//! Protocol adapters for OpenAI, Anthropic, and Ollama.
//!
//! Every adapter implements [`Provider`] over the same normalized types:
//!
//! - [`OpenAiProvider`] — Chat Completions API, SSE terminated by `data: [DONE]`
//! - [`AnthropicProvider`] — Messages API, event-tagged SSE ending in `message_stop`
//! - [`OllamaProvider`] — Native `/api/chat`, newline-delimited JSON ending in `done: true`
//! - [`ProviderRegistry`] — Explicit name-to-adapter table composed by the caller
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sage_llm::{ProviderRegistry, Request};
//!
//! let registry = ProviderRegistry::with_defaults();
//! let openai = registry.get("openai")?;
//!
//! let req = Request::new("gpt-4o", "2+2?").with_api_key(key);
//! let response = openai.complete(req).await?;
//! println!("{} ({} tokens)", response.content, response.usage.completion_tokens);
//! ```
//!
//! # Streaming
//!
//! ```rust,ignore
//! use sage_llm::{AnthropicProvider, Chunk, Provider, Request};
//!
//! let provider = AnthropicProvider::new();
//! let mut stream = provider
//!     .complete_stream(Request::new("claude-sonnet-4-20250514", "Hi").with_api_key(key))
//!     .await?;
//!
//! while let Some(chunk) = stream.next_chunk().await {
//!     match chunk {
//!         Chunk::Content(text) => print!("{}", text),
//!         Chunk::Done => break,
//!         Chunk::Error(e) => return Err(e),
//!     }
//! }
//! ```

mod anthropic;
mod http;
mod ollama;
mod openai;
mod registry;
mod stream;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use registry::{ProviderRegistry, ProviderRegistryBuilder};
pub use sage_core::{Chunk, ChunkStream, ModelInfo, Provider, Request, Response, SageError, Usage};
