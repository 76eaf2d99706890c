//! Profile-driven façade over the provider registry.

use std::sync::Arc;
use std::time::Duration;

use sage_config::{ConfigError, Profile, SageConfig, DEFAULT_ACCOUNT};
use sage_core::{ChunkStream, ModelInfo, Provider, Request, Response, SageError};
use sage_llm::ProviderRegistry;
use secrecy::ExposeSecret;
use tracing::debug;

/// Errors from the [`Client`]: either the configuration could not be
/// resolved or the provider call failed.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] SageError),
}

/// What the caller wants answered; the profile decides where it goes.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
}

impl Prompt {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Self::default() }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Resolves profiles into provider requests and dispatches them.
///
/// A profile names a provider, an account, and a model. The provider's
/// settings supply the base URL override and the account's API key. Providers
/// without settings are called with neither.
#[derive(Debug, Clone)]
pub struct Client {
    config: SageConfig,
    registry: ProviderRegistry,
}

impl Client {
    pub fn new(config: SageConfig, registry: ProviderRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &SageConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Sends `prompt` through `profile` (or the default profile) and waits for the full reply.
    pub async fn complete(&self, profile: Option<&str>, prompt: Prompt) -> Result<Response, Error> {
        let (provider, req) = self.resolve(profile, prompt)?;
        Ok(provider.complete(req).await?)
    }

    /// Sends `prompt` through `profile` (or the default profile) and streams the reply.
    pub async fn complete_stream(
        &self,
        profile: Option<&str>,
        prompt: Prompt,
    ) -> Result<ChunkStream, Error> {
        let (provider, req) = self.resolve(profile, prompt)?;
        Ok(provider.complete_stream(req).await?)
    }

    /// Lists the models of `provider` using the credentials of `account`.
    pub async fn list_models(
        &self,
        provider: &str,
        account: Option<&str>,
    ) -> Result<Vec<ModelInfo>, Error> {
        let adapter = self.registry.get(provider)?;
        let account = account.unwrap_or(DEFAULT_ACCOUNT);

        let (api_key, base_url) = match self.config.providers.get(provider) {
            Some(settings) => (settings.api_key(provider, account)?, settings.base_url.as_deref()),
            None => (None, None),
        };

        let api_key = api_key.as_ref().map(|k| k.expose_secret());
        Ok(adapter.list_models(api_key, base_url).await?)
    }

    /// Returns every profile, sorted by name.
    pub fn profiles(&self) -> Vec<(&str, &Profile)> {
        let mut profiles: Vec<(&str, &Profile)> = self
            .config
            .profiles
            .iter()
            .map(|(name, profile)| (name.as_str(), profile))
            .collect();
        profiles.sort_by(|a, b| a.0.cmp(b.0));
        profiles
    }

    pub fn default_profile(&self) -> Option<&str> {
        self.config.default_profile.as_deref()
    }

    fn resolve(
        &self,
        profile_name: Option<&str>,
        prompt: Prompt,
    ) -> Result<(Arc<dyn Provider>, Request), Error> {
        let profile = self.config.profile(profile_name)?;
        let provider = self.registry.get(&profile.provider)?;

        let mut req = Request::new(&profile.model, prompt.prompt);
        req.system = prompt.system;
        req.max_tokens = prompt.max_tokens;
        req.timeout = prompt.timeout;

        if let Some(settings) = self.config.providers.get(&profile.provider) {
            req.api_key = settings.api_key(&profile.provider, &profile.account)?;
            req.base_url = settings.base_url.clone();
        }

        debug!(
            provider = %profile.provider,
            account = %profile.account,
            model = %profile.model,
            "resolved profile"
        );
        Ok((provider, req))
    }
}
