use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use sage_core::{Provider, SageError};

use crate::{AnthropicProvider, OllamaProvider, OpenAiProvider};

/// Name-to-adapter table, built once by the entry point.
///
/// The registry is immutable after [`ProviderRegistryBuilder::build`]; clones
/// share the same adapters.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<HashMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    /// Starts an empty registry.
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Creates a registry with the built-in adapters.
    ///
    /// Includes `openai`, `anthropic`, and `ollama`, all sharing one
    /// connection pool.
    pub fn with_defaults() -> Self {
        let client = Client::new();
        Self::builder()
            .register(OpenAiProvider::with_client(client.clone()))
            .register(AnthropicProvider::with_client(client.clone()))
            .register(OllamaProvider::with_client(client))
            .build()
    }

    /// Gets an adapter by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, SageError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| SageError::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Returns the registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry").field("providers", &self.names()).finish()
    }
}

#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistryBuilder {
    /// Registers an adapter under its own [`Provider::name`].
    ///
    /// A later registration with the same name replaces the earlier one.
    pub fn register<P: Provider + 'static>(self, provider: P) -> Self {
        self.register_arc(Arc::new(provider))
    }

    pub fn register_arc(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry { providers: Arc::new(self.providers) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_registered() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["anthropic", "ollama", "openai"]);
        assert!(registry.contains("ollama"));
        assert_eq!(registry.get("anthropic").unwrap().name(), "anthropic");
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = ProviderRegistry::builder().register(OpenAiProvider::new()).build();
        assert!(!registry.contains("anthropic"));
        assert_eq!(
            registry.get("anthropic").err(),
            Some(SageError::UnknownProvider("anthropic".into()))
        );
    }

    #[test]
    fn empty_registry() {
        let registry = ProviderRegistry::default();
        assert!(registry.names().is_empty());
        assert!(registry.get("openai").is_err());
    }
}
