//! # Sage — One client for OpenAI, Anthropic, and Ollama
//!
//! Sage normalizes three completion protocols (OpenAI SSE, Anthropic
//! event-tagged SSE, Ollama NDJSON) into one request, response, and chunk
//! model, and resolves named **profiles** into provider calls.
//!
//! ## Quick Start — Profiles
//!
//! ```rust,ignore
//! use sage::prelude::*;
//!
//! let client = Client::new(SageConfig::from_env(), ProviderRegistry::with_defaults());
//!
//! let response = client.complete(None, Prompt::new("2+2?")).await?;
//! println!("{}", response.content);
//! ```
//!
//! ## Quick Start — Streaming
//!
//! ```rust,ignore
//! use sage::prelude::*;
//!
//! let mut stream = client
//!     .complete_stream(Some("local"), Prompt::new("Tell me a story").with_system("Be brief."))
//!     .await?;
//!
//! while let Some(chunk) = stream.next_chunk().await {
//!     match chunk {
//!         Chunk::Content(text) => print!("{}", text),
//!         Chunk::Done => break,
//!         Chunk::Error(e) => return Err(e.into()),
//!     }
//! }
//! ```
//!
//! ## Crate Structure
//!
//! | Crate | Description |
//! |-------|-------------|
//! | [`sage_core`] | Request, response, chunk, error, and the `Provider` trait |
//! | [`sage_llm`] | OpenAI, Anthropic, and Ollama adapters plus the registry |
//! | [`sage_config`] | Profiles and provider settings |

mod client;

pub use client::{Client, Error, Prompt};

// Re-export config types
pub use sage_config::{AccountSettings, ConfigError, Profile, ProviderSettings, SageConfig};

// Re-export core types
pub use sage_core::{
    Chunk, ChunkStream, ModelInfo, Provider, Request, Response, SageError, Usage,
};

// Re-export adapters
pub use sage_llm::{
    AnthropicProvider, OllamaProvider, OpenAiProvider, ProviderRegistry, ProviderRegistryBuilder,
};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use sage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Client, Error, Prompt};

    pub use crate::{Chunk, ChunkStream, ModelInfo, Request, Response, SageError, Usage};

    pub use crate::{Profile, SageConfig};

    pub use crate::{Provider, ProviderRegistry};
}
